//! Credentials file and identity lookup.
//!
//! The file holds one `username:password:level` entry per line. Blank lines
//! and `#` comments are ignored; lines with the wrong field count or an
//! unknown level are skipped with a warning.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, warn};

/// Permission level of an identity (and of the server-wide policy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PermissionLevel {
    #[value(name = "readonly")]
    ReadOnly,
    #[value(name = "readwrite")]
    ReadWrite,
    #[value(name = "all")]
    All,
}

impl FromStr for PermissionLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "readonly" => Ok(Self::ReadOnly),
            "readwrite" => Ok(Self::ReadWrite),
            "all" => Ok(Self::All),
            other => Err(format!("unknown permission level: {}", other)),
        }
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "readonly"),
            Self::ReadWrite => write!(f, "readwrite"),
            Self::All => write!(f, "all"),
        }
    }
}

/// A credentials file entry.
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    password: String,
    pub level: PermissionLevel,
}

impl Identity {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        level: PermissionLevel,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            level,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.level == PermissionLevel::All
    }

    fn password_matches(&self, candidate: &str) -> bool {
        bool::from(self.password.as_bytes().ct_eq(candidate.as_bytes()))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("username", &self.username)
            .field("level", &self.level)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("failed to read credentials file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Usernames mapped to identities. Immutable once loaded.
#[derive(Debug, Default)]
pub struct UserStore {
    users: HashMap<String, Identity>,
}

impl UserStore {
    pub fn load(path: &Path) -> Result<Self, UserStoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| UserStoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    pub fn parse(content: &str) -> Self {
        let mut users = HashMap::new();

        for (index, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let parts: Vec<&str> = line.split(':').collect();
            if parts.len() != 3 {
                debug!("Skipping credentials line {}: wrong field count", index + 1);
                continue;
            }

            let username = parts[0].trim();
            let password = parts[1].trim();
            let level = match parts[2].parse::<PermissionLevel>() {
                Ok(level) => level,
                Err(err) => {
                    warn!("Skipping credentials line {}: {}", index + 1, err);
                    continue;
                }
            };

            users.insert(
                username.to_string(),
                Identity::new(username, password, level),
            );
        }

        Self { users }
    }

    /// Exact username lookup followed by a password comparison.
    pub fn identify(&self, credentials: Option<(&str, &str)>) -> Option<&Identity> {
        let (username, password) = credentials?;
        let identity = self.users.get(username)?;
        identity.password_matches(password).then_some(identity)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
