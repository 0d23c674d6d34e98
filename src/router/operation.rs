//! Request classification.
//!
//! Every request to the browse surface maps to exactly one [`Operation`]
//! before any handler runs, and every operation names the capability it
//! needs.

use std::collections::HashMap;
use std::path::Path;

use axum::http::Method;

use crate::auth::Capability;
use crate::error::ServeError;
use crate::markdown::is_markdown;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Upload,
    /// Root-relative path of the entry to remove.
    Delete { target: String },
    /// Root-relative source path and the new leaf name.
    Rename { target: String, new_name: String },
    Mkdir { name: String },
    Edit,
    Zip,
    ZipFiles,
    Markdown,
    /// Directory listing or raw file, decided by what is on disk.
    View,
}

impl Operation {
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::Upload => Capability::Upload,
            Self::Delete { .. } | Self::Rename { .. } | Self::Mkdir { .. } | Self::Edit => {
                Capability::Modify
            }
            Self::Zip | Self::ZipFiles | Self::Markdown | Self::View => Capability::Read,
        }
    }

    /// Operations answering with `{"success": ..}` bodies.
    pub fn is_json(&self) -> bool {
        matches!(
            self,
            Self::Delete { .. } | Self::Rename { .. } | Self::Mkdir { .. } | Self::Edit
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Delete { .. } => "delete",
            Self::Rename { .. } => "rename",
            Self::Mkdir { .. } => "mkdir",
            Self::Edit => "edit",
            Self::Zip => "zip",
            Self::ZipFiles => "zipfiles",
            Self::Markdown => "markdown",
            Self::View => "view",
        }
    }
}

/// Classify a request by method and query markers.
///
/// Markers are checked in a fixed order and only count when non-empty.
/// Mutations only count on POST; `target` decides whether `markdown` applies.
pub fn classify(
    method: &Method,
    query: &HashMap<String, String>,
    target: &Path,
) -> Result<Operation, ServeError> {
    let marker = |key: &str| query.get(key).map(String::as_str).filter(|v| !v.is_empty());
    let post = method == Method::POST;

    if post {
        if marker("upload").is_some() {
            return Ok(Operation::Upload);
        }
        if let Some(target) = marker("delete") {
            return Ok(Operation::Delete {
                target: target.to_string(),
            });
        }
        if let Some(target) = marker("rename") {
            return Ok(Operation::Rename {
                target: target.to_string(),
                new_name: marker("newname").unwrap_or_default().to_string(),
            });
        }
        if let Some(name) = marker("mkdir") {
            return Ok(Operation::Mkdir {
                name: name.to_string(),
            });
        }
        if marker("edit").is_some() {
            return Ok(Operation::Edit);
        }
    }

    if marker("zip").is_some() {
        return Ok(Operation::Zip);
    }
    if post && marker("zipfiles").is_some() {
        return Ok(Operation::ZipFiles);
    }

    if method != Method::GET && method != Method::HEAD {
        return Err(ServeError::MethodNotAllowed);
    }

    if marker("markdown").is_some() && is_markdown(target) {
        return Ok(Operation::Markdown);
    }

    Ok(Operation::View)
}
