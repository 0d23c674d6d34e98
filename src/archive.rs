//! Zip archives of directories and selections.
//!
//! An archive is planned first, which is where the limits apply, and then
//! written on a blocking thread into a pipe whose read half becomes the
//! response body. Nothing is buffered beyond the pipe.

use std::io::Write;
use std::path::{Path, PathBuf};

use tokio::io::DuplexStream;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::config::Config;
use crate::error::ServeError;
use crate::paths::relative_url;

const PIPE_CAPACITY: usize = 64 * 1024;

/// Size caps for a single archive. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipLimits {
    pub max_bytes: u64,
    pub max_entries: u64,
}

impl ZipLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_bytes: config.max_zip_bytes,
            max_entries: config.max_zip_entries,
        }
    }
}

/// One member of a planned archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveEntry {
    /// Directory marker; the name ends with `/`.
    Directory { name: String },
    File { name: String, source: PathBuf },
}

impl ArchiveEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Directory { name } | Self::File { name, .. } => name,
        }
    }
}

/// Running totals of the files admitted into a plan.
struct Budget {
    limits: ZipLimits,
    bytes: u64,
    files: u64,
}

impl Budget {
    fn new(limits: ZipLimits) -> Self {
        Self {
            limits,
            bytes: 0,
            files: 0,
        }
    }

    fn admit(&mut self, size: u64) -> Result<(), ServeError> {
        self.files = self.files.saturating_add(1);
        self.bytes = self.bytes.saturating_add(size);

        let ZipLimits {
            max_bytes,
            max_entries,
        } = self.limits;
        if max_entries > 0 && self.files > max_entries {
            return Err(ServeError::ZipTooManyEntries {
                entries: self.files,
                limit: max_entries,
            });
        }
        if max_bytes > 0 && self.bytes > max_bytes {
            return Err(ServeError::ZipTooLarge {
                size: self.bytes,
                limit: max_bytes,
            });
        }
        Ok(())
    }
}

/// List every member for `paths`, named relative to `base`.
///
/// Directories are walked in name order. `base` itself gets no entry.
pub fn plan_archive(
    base: &Path,
    paths: &[PathBuf],
    limits: ZipLimits,
) -> Result<Vec<ArchiveEntry>, ServeError> {
    let mut budget = Budget::new(limits);
    let mut entries = Vec::new();

    for path in paths {
        let walker = WalkDir::new(path).sort_by_file_name();
        for item in walker.into_iter().filter_map(Result::ok) {
            let name = member_name(base, item.path());
            if name.is_empty() {
                continue;
            }

            if item.file_type().is_dir() {
                entries.push(ArchiveEntry::Directory {
                    name: format!("{}/", name),
                });
            } else if item.file_type().is_file() {
                budget.admit(item.metadata().map_err(std::io::Error::from)?.len())?;
                entries.push(ArchiveEntry::File {
                    name,
                    source: item.into_path(),
                });
            }
        }
    }

    Ok(entries)
}

fn member_name(base: &Path, path: &Path) -> String {
    if path == base {
        return String::new();
    }
    let relative = relative_url(base, path);
    if !relative.is_empty() {
        return relative;
    }
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Write `entries` as a zip into a forward-only sink.
pub fn write_entries<W: Write>(entries: &[ArchiveEntry], sink: W) -> Result<(), ServeError> {
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);
    let mut zip = ZipWriter::new_stream(sink);

    for entry in entries {
        match entry {
            ArchiveEntry::Directory { name } => {
                zip.add_directory(name.as_str(), options).map_err(zip_error)?;
            }
            ArchiveEntry::File { name, source } => {
                zip.start_file(name.as_str(), options).map_err(zip_error)?;
                let mut input = std::fs::File::open(source)?;
                std::io::copy(&mut input, &mut zip)?;
            }
        }
    }

    zip.finish().map_err(zip_error)?.flush()?;
    Ok(())
}

fn zip_error(error: zip::result::ZipError) -> ServeError {
    ServeError::Io(std::io::Error::other(error.to_string()))
}

/// Plan `paths` and start streaming the archive.
///
/// Limit and filesystem errors surface here, before any byte is sent. A
/// failure while writing ends the stream early.
pub async fn stream_archive(
    base: PathBuf,
    paths: Vec<PathBuf>,
    limits: ZipLimits,
) -> Result<ReaderStream<DuplexStream>, ServeError> {
    let entries = tokio::task::spawn_blocking(move || plan_archive(&base, &paths, limits))
        .await
        .map_err(|err| ServeError::internal(err.to_string()))??;

    let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
    let sink = SyncIoBridge::new(writer);

    tokio::task::spawn_blocking(move || match write_entries(&entries, sink) {
        Ok(()) => debug!("Zip stream finished: {} entries", entries.len()),
        Err(err) => warn!("Zip stream aborted: {}", err),
    });

    Ok(ReaderStream::new(reader))
}
