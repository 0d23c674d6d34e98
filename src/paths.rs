//! Request path resolution and containment.
//!
//! Two path families live here and must never be mixed:
//! filesystem paths, built with native joining and checked against the
//! served root, and URL paths, built with `/` regardless of host OS for
//! links sent back to the client.

use std::path::{Component, MAIN_SEPARATOR, Path, PathBuf};

use tracing::warn;

use crate::error::ServeError;

/// Percent-decode the path part of a request URI.
pub fn decode_url_path(raw: &str) -> Result<String, ServeError> {
    urlencoding::decode(raw)
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ServeError::bad_request("Invalid path encoding"))
}

/// Lexically clean a request path into its segments.
///
/// `.` and empty segments are dropped and `..` removes the previous segment.
/// A `..` with nothing left to remove would climb above the served root and
/// is rejected rather than clamped.
pub fn clean_segments(request_path: &str) -> Result<Vec<&str>, ServeError> {
    let mut segments: Vec<&str> = Vec::new();

    for segment in request_path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                if segments.pop().is_none() {
                    warn!("Path traversal attempt: {:?}", request_path);
                    return Err(ServeError::PathTraversal);
                }
            }
            other => {
                if other.contains('\0') {
                    warn!("Path segment contains null byte: {:?}", request_path);
                    return Err(ServeError::PathTraversal);
                }
                segments.push(other);
            }
        }
    }

    Ok(segments)
}

/// Resolve a request path to a filesystem path under `root`.
///
/// Never touches the disk. The result is `root` itself or a descendant of it.
pub fn resolve(root: &Path, request_path: &str) -> Result<PathBuf, ServeError> {
    let segments = clean_segments(request_path)?;

    let mut candidate = root.to_path_buf();
    for segment in segments {
        push_segment(&mut candidate, segment)?;
    }

    if !is_under_dir(&candidate, root) {
        warn!(
            "Resolved path {:?} is outside root {:?}",
            candidate.display(),
            root.display()
        );
        return Err(ServeError::PathTraversal);
    }

    Ok(candidate)
}

/// Push one URL segment, refusing anything the host OS would not treat as a
/// single plain name (e.g. `a\..\b` or `C:` on Windows).
fn push_segment(path: &mut PathBuf, segment: &str) -> Result<(), ServeError> {
    let mut components = Path::new(segment).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => {
            path.push(name);
            Ok(())
        }
        _ => {
            warn!("Rejected path segment {:?}", segment);
            Err(ServeError::PathTraversal)
        }
    }
}

/// Whether `path` equals `base` or lies beneath it.
///
/// Both sides get a trailing separator before the prefix test so that a root
/// of `/data` does not accept `/database`.
pub fn is_under_dir(path: &Path, base: &Path) -> bool {
    let sep = MAIN_SEPARATOR as u8;

    let mut base_bytes = base.as_os_str().as_encoded_bytes().to_vec();
    while base_bytes.last() == Some(&sep) {
        base_bytes.pop();
    }
    base_bytes.push(sep);

    let mut path_bytes = path.as_os_str().as_encoded_bytes().to_vec();
    path_bytes.push(sep);

    path_bytes.starts_with(&base_bytes)
}

/// Clean the client-supplied relative path of an uploaded file.
///
/// Accepts both `/` and `\` as separators so folder uploads from any client
/// keep their structure; any `..` segment rejects the file.
pub fn clean_upload_path(relative: &str) -> Result<PathBuf, ServeError> {
    let mut cleaned = PathBuf::new();

    for segment in relative.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(ServeError::bad_request(format!(
                    "invalid path: {}",
                    relative
                )));
            }
            other => {
                push_segment(&mut cleaned, other).map_err(|_| {
                    ServeError::bad_request(format!("invalid path: {}", relative))
                })?;
            }
        }
    }

    if cleaned.as_os_str().is_empty() {
        return Err(ServeError::bad_request(format!(
            "invalid path: {}",
            relative
        )));
    }

    Ok(cleaned)
}

/// Validate a name that must stay a single path segment (mkdir, rename).
pub fn is_single_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains("..")
        && !name.contains('\0')
}

/// Last segment of a client-supplied path, ignoring trailing slashes.
pub fn leaf_name(path: &str) -> Option<&str> {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|leaf| !leaf.is_empty() && *leaf != "." && *leaf != "..")
}

/// Join a URL path and a child name with `/`.
pub fn join_url(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    format!("{}/{}", base, name.trim_start_matches('/'))
}

/// Relative path of `full_path` under `root`, always `/`-separated.
pub fn relative_url(root: &Path, full_path: &Path) -> String {
    let Ok(relative) = full_path.strip_prefix(root) else {
        return String::new();
    };

    let mut parts = Vec::new();
    for component in relative.components() {
        if let Component::Normal(part) = component {
            parts.push(part.to_string_lossy().to_string());
        }
    }

    parts.join("/")
}

/// Breadcrumb trail for a URL path: `/a/b` gives `[("a", "/a"), ("b", "/a/b")]`.
pub fn breadcrumbs(url_path: &str) -> Vec<(String, String)> {
    let mut crumbs = Vec::new();
    let mut current = String::new();

    for part in url_path.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        crumbs.push((part.to_string(), current.clone()));
    }

    crumbs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/data")
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    #[test]
    fn test_resolve_normal() {
        let result = resolve(&root(), "/subdir/file.txt").unwrap();
        assert_eq!(result, root().join("subdir").join("file.txt"));
    }

    #[test]
    fn test_resolve_root() {
        assert_eq!(resolve(&root(), "/").unwrap(), root());
        assert_eq!(resolve(&root(), "").unwrap(), root());
        assert_eq!(resolve(&root(), "/./").unwrap(), root());
    }

    #[test]
    fn test_resolve_collapses_inner_parent_segments() {
        let result = resolve(&root(), "/a/b/../c/./d.txt").unwrap();
        assert_eq!(result, root().join("a").join("c").join("d.txt"));

        let result = resolve(&root(), "/a/..").unwrap();
        assert_eq!(result, root());
    }

    #[test]
    fn test_resolve_rejects_sibling_escape() {
        let result = resolve(&root(), "/../database/secrets.txt");
        assert!(matches!(result, Err(ServeError::PathTraversal)));
    }

    #[test]
    fn test_resolve_rejects_parent_escapes() {
        for path in ["..", "/..", "/a/../..", "/a/b/../../../etc/passwd", "../../"] {
            let result = resolve(&root(), path);
            assert!(
                matches!(result, Err(ServeError::PathTraversal)),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_resolve_never_leaves_root() {
        let inputs = [
            "/a/../../b",
            "//etc/passwd",
            "/./../x",
            "/a/./b/../../..",
            "/a//b///c",
            "/%2e%2e/x",
        ];
        for input in inputs {
            if let Ok(path) = resolve(&root(), input) {
                assert!(is_under_dir(&path, &root()), "{input} escaped to {path:?}");
            }
        }
    }

    #[test]
    fn test_resolve_rejects_null_bytes() {
        let result = resolve(&root(), "/file\0.txt");
        assert!(matches!(result, Err(ServeError::PathTraversal)));
    }

    #[test]
    fn test_resolve_absolute_looking_path_stays_inside() {
        let result = resolve(&root(), "//etc/passwd").unwrap();
        assert_eq!(result, root().join("etc").join("passwd"));
    }

    #[test]
    fn test_decode_then_resolve_catches_encoded_traversal() {
        let decoded = decode_url_path("/%2E%2E/database").unwrap();
        assert!(matches!(
            resolve(&root(), &decoded),
            Err(ServeError::PathTraversal)
        ));
    }

    #[test]
    fn test_decode_url_path_spaces() {
        assert_eq!(decode_url_path("/my%20file.txt").unwrap(), "/my file.txt");
    }

    // ========================================================================
    // Containment
    // ========================================================================

    #[test]
    fn test_is_under_dir_prefix_collision() {
        let base = Path::new("/data");
        assert!(is_under_dir(Path::new("/data"), base));
        assert!(is_under_dir(Path::new("/data/file"), base));
        assert!(!is_under_dir(Path::new("/database"), base));
        assert!(!is_under_dir(Path::new("/dat"), base));
        assert!(!is_under_dir(Path::new("/"), base));
    }

    #[test]
    fn test_is_under_dir_trailing_separator_on_base() {
        assert!(is_under_dir(Path::new("/data/x"), Path::new("/data/")));
        assert!(is_under_dir(Path::new("/x"), Path::new("/")));
    }

    // ========================================================================
    // Upload paths
    // ========================================================================

    #[test]
    fn test_clean_upload_path_keeps_structure() {
        assert_eq!(
            clean_upload_path("sub/dir/file.txt").unwrap(),
            PathBuf::from("sub").join("dir").join("file.txt")
        );
        assert_eq!(
            clean_upload_path("sub\\win\\file.txt").unwrap(),
            PathBuf::from("sub").join("win").join("file.txt")
        );
        assert_eq!(
            clean_upload_path("./a//b.txt").unwrap(),
            PathBuf::from("a").join("b.txt")
        );
    }

    #[test]
    fn test_clean_upload_path_rejects_traversal() {
        for name in ["../../etc/passwd", "a/../../b", "..\\x", "..", "", "/", "./"] {
            assert!(clean_upload_path(name).is_err(), "{name:?} should be rejected");
        }
    }

    #[test]
    fn test_clean_upload_path_strips_absolute_prefix() {
        assert_eq!(
            clean_upload_path("/etc/passwd").unwrap(),
            PathBuf::from("etc").join("passwd")
        );
    }

    // ========================================================================
    // Names and URLs
    // ========================================================================

    #[test]
    fn test_is_single_segment() {
        assert!(is_single_segment("photos"));
        assert!(is_single_segment("my file.txt"));
        assert!(!is_single_segment(""));
        assert!(!is_single_segment("."));
        assert!(!is_single_segment(".."));
        assert!(!is_single_segment("a/b"));
        assert!(!is_single_segment("a\\b"));
        assert!(!is_single_segment("..hidden"));
    }

    #[test]
    fn test_leaf_name() {
        assert_eq!(leaf_name("/docs/report.pdf"), Some("report.pdf"));
        assert_eq!(leaf_name("/docs/photos/"), Some("photos"));
        assert_eq!(leaf_name("plain.txt"), Some("plain.txt"));
        assert_eq!(leaf_name("../../etc/passwd"), Some("passwd"));
        assert_eq!(leaf_name("/docs/.."), None);
        assert_eq!(leaf_name("/"), None);
        assert_eq!(leaf_name(""), None);
    }

    #[test]
    fn test_join_url_uses_forward_slashes() {
        assert_eq!(join_url("/", "a.txt"), "/a.txt");
        assert_eq!(join_url("/docs", "a.txt"), "/docs/a.txt");
        assert_eq!(join_url("/docs/", "a.txt"), "/docs/a.txt");
        assert_eq!(join_url("", "a.txt"), "/a.txt");
    }

    #[test]
    fn test_relative_url() {
        let root = root();
        let full = root.join("a").join("b.txt");
        assert_eq!(relative_url(&root, &full), "a/b.txt");
        assert_eq!(relative_url(&root, &root), "");
        assert_eq!(relative_url(&root, Path::new("/elsewhere")), "");
    }

    #[test]
    fn test_breadcrumbs() {
        assert!(breadcrumbs("/").is_empty());
        assert!(breadcrumbs("").is_empty());
        assert_eq!(
            breadcrumbs("/a/b/"),
            vec![
                ("a".to_string(), "/a".to_string()),
                ("b".to_string(), "/a/b".to_string()),
            ]
        );
    }
}
