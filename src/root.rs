//! The served root directory and the WebDAV handler bound to it.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use dav_server::{DavHandler, localfs::LocalFs, memls::MemLs};
use thiserror::Error;
use tracing::info;

/// Mount point of the WebDAV endpoint.
pub const WEBDAV_PREFIX: &str = "/webdav";

#[derive(Debug, Error)]
pub enum RootError {
    #[error("Directory does not exist")]
    NotFound,

    #[error("Path is not a directory")]
    NotADirectory,

    #[error("Cannot access directory: {0}")]
    Io(#[from] std::io::Error),
}

/// A root directory together with the WebDAV handler serving it.
///
/// Both are always replaced together so a request never sees a root from one
/// generation and a handler from another.
#[derive(Clone)]
pub struct ServedRoot {
    pub root: PathBuf,
    pub dav: DavHandler,
}

impl ServedRoot {
    fn new(root: PathBuf) -> Self {
        let dav = DavHandler::builder()
            .filesystem(LocalFs::new(&root, false, false, false))
            .locksystem(MemLs::new())
            .strip_prefix(WEBDAV_PREFIX)
            .build_handler();
        Self { root, dav }
    }
}

/// Holds the current served root. Readers take a snapshot per request.
pub struct RootRegistry {
    current: RwLock<ServedRoot>,
}

impl RootRegistry {
    /// Validate `root` and build the initial registry.
    pub fn new(root: impl AsRef<Path>) -> Result<Self, RootError> {
        let root = validate(root.as_ref())?;
        Ok(Self {
            current: RwLock::new(ServedRoot::new(root)),
        })
    }

    /// Current root directory.
    pub fn get(&self) -> PathBuf {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .root
            .clone()
    }

    /// Current root and WebDAV handler as one consistent pair.
    pub fn snapshot(&self) -> ServedRoot {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Switch to a new root directory, returning its canonical form.
    ///
    /// On error nothing changes. In-flight requests keep the snapshot they
    /// already took.
    pub fn set(&self, new_root: impl AsRef<Path>) -> Result<PathBuf, RootError> {
        let root = validate(new_root.as_ref())?;
        let served = ServedRoot::new(root.clone());

        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let previous = std::mem::replace(&mut *current, served);
        drop(current);

        info!(
            "Root directory changed from {} to {}",
            previous.root.display(),
            root.display()
        );
        Ok(root)
    }
}

fn validate(path: &Path) -> Result<PathBuf, RootError> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(RootError::NotFound),
        Err(e) => return Err(RootError::Io(e)),
    };

    if !metadata.is_dir() {
        return Err(RootError::NotADirectory);
    }

    Ok(std::fs::canonicalize(path)?)
}
