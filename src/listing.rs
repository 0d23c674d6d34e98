//! Directory listings and the default HTML page for them.

use std::cmp::Ordering;
use std::fmt::Write as _;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::paths::{breadcrumbs, join_url};

/// One row of a directory listing.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    /// Path from the served root, `/`-separated, not encoded.
    pub path: String,
    /// Link target, `/`-separated and percent-encoded.
    pub url_path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Seconds since the Unix epoch
    pub modified: Option<u64>,
    pub editable: bool,
}

/// Everything a listing renderer needs for one page.
#[derive(Debug, Clone, Serialize)]
pub struct ListingPage {
    pub url_path: String,
    pub entries: Vec<FileEntry>,
    pub breadcrumbs: Vec<(String, String)>,
    pub can_upload: bool,
    pub can_modify: bool,
    pub version: &'static str,
}

impl ListingPage {
    pub fn new(url_path: &str, entries: Vec<FileEntry>, can_upload: bool, can_modify: bool) -> Self {
        Self {
            url_path: url_path.to_string(),
            breadcrumbs: breadcrumbs(url_path),
            entries,
            can_upload,
            can_modify,
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Turns a listing into a response body.
pub trait ListingRenderer: Send + Sync {
    fn render(&self, page: &ListingPage) -> String;
}

/// Read `dir` into listing entries, directories first then by name
/// ignoring case.
///
/// Entries whose metadata cannot be read are skipped.
pub fn read_listing(dir: &Path, url_path: &str) -> std::io::Result<Vec<FileEntry>> {
    let mut entries = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let Ok(entry) = entry else { continue };
        let Ok(metadata) = entry.metadata() else {
            continue;
        };

        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = metadata.is_dir();
        let mut url = join_url(url_path, &urlencoding::encode(&name));
        if is_dir {
            url.push('/');
        }

        entries.push(FileEntry {
            editable: !is_dir && is_editable(&name),
            path: join_url(url_path, &name),
            url_path: url,
            is_dir,
            size: if is_dir { 0 } else { metadata.len() },
            modified: metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
                .map(|d| d.as_secs()),
            name,
        });
    }

    sort_entries(&mut entries);
    Ok(entries)
}

pub fn sort_entries(entries: &mut [FileEntry]) {
    entries.sort_by(|a, b| match (a.is_dir, b.is_dir) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a
            .name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name)),
    });
}

/// Human readable size: `0 bytes`, `512 bytes`, `1.5 KB`, ...
pub fn format_size(size: u64) -> String {
    if size == 0 {
        return "0 bytes".to_string();
    }
    if size < 1024 {
        return format!("{} bytes", size);
    }

    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    let mut value = size as f64 / 1024.0;
    for unit in &UNITS[..UNITS.len() - 1] {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} {}", value, UNITS[UNITS.len() - 1])
}

const EDITABLE_EXTENSIONS: &[&str] = &[
    "txt", "md", "markdown", "go", "py", "js", "ts", "html", "htm", "css", "scss", "json", "xml",
    "yaml", "yml", "toml", "ini", "conf", "config", "sh", "bash", "zsh", "fish", "ps1", "bat",
    "cmd", "c", "cpp", "h", "hpp", "java", "kt", "scala", "rb", "php", "pl", "lua", "rs", "swift",
    "m", "sql", "csv", "tsv", "log", "env", "gitignore", "dockerfile", "makefile",
];

const EDITABLE_NAMES: &[&str] = &[
    "readme",
    "license",
    "makefile",
    "dockerfile",
    "gemfile",
    "rakefile",
];

/// Whether the listing offers in-browser editing for this file name.
pub fn is_editable(name: &str) -> bool {
    let lower = name.to_lowercase();
    // Dotfiles like `.env` count as an extension, not a stem.
    match lower.rsplit_once('.') {
        Some((_, ext)) => EDITABLE_EXTENSIONS.contains(&ext),
        None => EDITABLE_NAMES.contains(&lower.as_str()),
    }
}

fn format_modified(modified: Option<u64>) -> String {
    modified
        .and_then(|secs| DateTime::from_timestamp(i64::try_from(secs).ok()?, 0))
        .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Built-in listing page: plain HTML with a little script for the
/// mutation endpoints.
#[derive(Debug, Default, Clone, Copy)]
pub struct HtmlListing;

const STYLE: &str = "body{font-family:system-ui,sans-serif;margin:2rem;color:#222}\
table{border-collapse:collapse;width:100%}\
td,th{padding:.35rem .6rem;text-align:left;border-bottom:1px solid #eee}\
td.size,td.mod{white-space:nowrap;color:#666}\
nav a{text-decoration:none}\
form{display:inline-block;margin:.5rem 1rem .5rem 0}\
button{cursor:pointer}\
footer{margin-top:2rem;color:#999;font-size:.8rem}";

const SCRIPT: &str = r#"function call(url, body) {
  return fetch(url, {method: 'POST', body: body})
    .then(r => r.json())
    .then(res => { if (res.success) { location.reload(); } else { alert(res.error || 'Failed'); } });
}
function removeEntry(name) {
  if (confirm('Delete ' + name + '?')) { call('?delete=' + encodeURIComponent(name)); }
}
function renameEntry(name) {
  const next = prompt('New name', name.split('/').pop());
  if (next) {
    call('?rename=' + encodeURIComponent(name) + '&newname=' + encodeURIComponent(next));
  }
}
function makeDir() {
  const name = prompt('Folder name');
  if (name) { call('?mkdir=' + encodeURIComponent(name)); }
}
function editEntry(url) {
  fetch(url).then(r => r.text()).then(text => {
    const next = prompt('Edit contents', text);
    if (next !== null) { call(url + '?edit=1', next); }
  });
}"#;

impl ListingRenderer for HtmlListing {
    fn render(&self, page: &ListingPage) -> String {
        let title = html_escape(&page.url_path);
        let base = if page.url_path.ends_with('/') {
            page.url_path.clone()
        } else {
            format!("{}/", page.url_path)
        };
        let mut html = String::new();

        let _ = write!(
            html,
            "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
             <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
             <title>Index of {title}</title><style>{STYLE}</style></head><body>\n"
        );

        html.push_str("<nav><a href=\"/\">/</a>");
        for (name, path) in &page.breadcrumbs {
            let _ = write!(
                html,
                " <a href=\"{}/\">{}</a> /",
                html_escape(&encode_url_path(path)),
                html_escape(name)
            );
        }
        html.push_str("</nav>\n");

        html.push_str("<div class=\"actions\">");
        let _ = write!(
            html,
            "<a href=\"{}?zip=1\">Download folder</a> ",
            html_escape(&base)
        );
        if page.can_upload {
            let _ = write!(
                html,
                "<form method=\"post\" enctype=\"multipart/form-data\" action=\"{}?upload=1\">\
                 <input type=\"file\" name=\"files\" multiple> <button type=\"submit\">Upload</button></form>",
                html_escape(&base)
            );
        }
        if page.can_modify {
            html.push_str("<button type=\"button\" onclick=\"makeDir()\">New folder</button>");
        }
        html.push_str("</div>\n");

        html.push_str("<table><thead><tr><th>Name</th><th>Size</th><th>Modified</th>");
        if page.can_modify {
            html.push_str("<th></th>");
        }
        html.push_str("</tr></thead><tbody>\n");

        for entry in &page.entries {
            let name = html_escape(&entry.name);
            let href = html_escape(&entry.url_path);
            let label = if entry.is_dir {
                format!("{}/", name)
            } else {
                name.clone()
            };
            let size = if entry.is_dir {
                "-".to_string()
            } else {
                format_size(entry.size)
            };

            let _ = write!(
                html,
                "<tr><td><a href=\"{href}\">{label}</a></td><td class=\"size\">{size}</td>\
                 <td class=\"mod\">{}</td>",
                format_modified(entry.modified)
            );

            if page.can_modify {
                let js_name = html_escape(&serde_json::to_string(&entry.path).unwrap_or_default());
                html.push_str("<td>");
                if entry.editable {
                    let js_url =
                        html_escape(&serde_json::to_string(&entry.url_path).unwrap_or_default());
                    let _ = write!(
                        html,
                        "<button type=\"button\" onclick=\"editEntry({js_url})\">Edit</button> "
                    );
                }
                let _ = write!(
                    html,
                    "<button type=\"button\" onclick=\"renameEntry({js_name})\">Rename</button> \
                     <button type=\"button\" onclick=\"removeEntry({js_name})\">Delete</button></td>"
                );
            }
            html.push_str("</tr>\n");
        }

        html.push_str("</tbody></table>\n");
        if page.can_modify {
            let _ = write!(html, "<script>{SCRIPT}</script>\n");
        }
        let _ = write!(
            html,
            "<footer>dirshare {}</footer></body></html>\n",
            page.version
        );

        html
    }
}

/// Percent-encode each segment of a `/`-separated path.
fn encode_url_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(name: &str, is_dir: bool) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            path: format!("/{}", name),
            url_path: format!("/{}", name),
            is_dir,
            size: 0,
            modified: None,
            editable: false,
        }
    }

    #[test]
    fn test_sort_directories_first_then_case_insensitive() {
        let mut entries = vec![
            entry("b.txt", false),
            entry("A", true),
            entry("a.txt", false),
        ];
        sort_entries(&mut entries);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "a.txt", "b.txt"]);
    }

    #[test]
    fn test_read_listing_order_and_urls() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("A")).unwrap();
        std::fs::write(dir.path().join("with space.md"), "# x").unwrap();

        let entries = read_listing(dir.path(), "/docs").unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["A", "a.txt", "b.txt", "with space.md"]);

        assert_eq!(entries[0].url_path, "/docs/A/");
        assert_eq!(entries[3].path, "/docs/with space.md");
        assert_eq!(entries[0].size, 0);
        assert_eq!(entries[2].size, 2);
        assert_eq!(entries[3].url_path, "/docs/with%20space.md");
        assert!(entries[3].editable);
        assert!(!entries[0].editable);
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 bytes");
        assert_eq!(format_size(1), "1 bytes");
        assert_eq!(format_size(1023), "1023 bytes");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_size(2048 * 1024 * 1024 * 1024 * 1024), "2048.0 TB");
    }

    #[test]
    fn test_is_editable() {
        assert!(is_editable("notes.txt"));
        assert!(is_editable("main.RS"));
        assert!(is_editable(".env"));
        assert!(is_editable("README"));
        assert!(is_editable("Makefile"));
        assert!(!is_editable("photo.png"));
        assert!(!is_editable("binary"));
    }

    #[test]
    fn test_html_listing_escapes_and_gates_actions() {
        let mut evil = entry("<script>.txt", false);
        evil.url_path = "/%3Cscript%3E.txt".to_string();
        let page = ListingPage::new("/", vec![evil], false, false);
        let html = HtmlListing.render(&page);

        assert!(html.contains("&lt;script&gt;.txt"));
        assert!(!html.contains("<script>.txt"));
        assert!(!html.contains("?upload=1"));
        assert!(!html.contains("removeEntry("));
    }

    #[test]
    fn test_html_listing_shows_actions_when_allowed() {
        let page = ListingPage::new("/sub", vec![entry("a.txt", false)], true, true);
        let html = HtmlListing.render(&page);

        assert!(html.contains("/sub/?upload=1"));
        assert!(html.contains("removeEntry("));
        assert!(html.contains("makeDir()"));
        assert!(html.contains("<a href=\"/sub/\">sub</a>"));
    }
}
