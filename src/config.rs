use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::auth::PermissionLevel;
use crate::error::StartupError;

/// Server configuration loaded from an optional TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum size of a single uploaded file (in bytes)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,

    /// Multiplier applied to `max_upload_size` for a whole multipart request
    #[serde(default = "default_upload_batch_factor")]
    pub upload_batch_factor: u64,

    /// Maximum uncompressed bytes in a zip download (0 = unlimited)
    #[serde(default)]
    pub max_zip_bytes: u64,

    /// Maximum number of files in a zip download (0 = unlimited)
    #[serde(default)]
    pub max_zip_entries: u64,

    /// Realm sent in the Basic auth challenge
    #[serde(default = "default_realm")]
    pub realm: String,

    /// Whether `/_api/chdir` is served at all
    #[serde(default = "default_allow_root_change")]
    pub allow_root_change: bool,

    /// Syntect theme used for fenced code in rendered markdown
    #[serde(default = "default_markdown_theme")]
    pub markdown_theme: String,
}

fn default_max_upload_size() -> u64 {
    100 * 1024 * 1024 // 100 MB
}

fn default_upload_batch_factor() -> u64 {
    10
}

fn default_realm() -> String {
    "dirshare".to_string()
}

fn default_allow_root_change() -> bool {
    true
}

fn default_markdown_theme() -> String {
    "base16-ocean.dark".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_upload_size: default_max_upload_size(),
            upload_batch_factor: default_upload_batch_factor(),
            max_zip_bytes: 0,
            max_zip_entries: 0,
            realm: default_realm(),
            allow_root_change: default_allow_root_change(),
            markdown_theme: default_markdown_theme(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, StartupError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StartupError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, StartupError> {
        toml::from_str(content).map_err(|e| StartupError::Config(e.to_string()))
    }

    /// Upper bound for an entire request body (multipart batches, edits).
    pub fn max_request_size(&self) -> u64 {
        self.max_upload_size
            .saturating_mul(self.upload_batch_factor.max(1))
    }
}

/// Server-wide capability flags, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StaticPolicy {
    pub allow_upload: bool,
    pub allow_modify: bool,
}

impl StaticPolicy {
    pub fn from_level(level: PermissionLevel) -> Self {
        match level {
            PermissionLevel::ReadOnly => Self {
                allow_upload: false,
                allow_modify: false,
            },
            PermissionLevel::ReadWrite => Self {
                allow_upload: true,
                allow_modify: false,
            },
            PermissionLevel::All => Self {
                allow_upload: true,
                allow_modify: true,
            },
        }
    }
}
