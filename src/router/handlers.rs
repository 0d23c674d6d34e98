//! Operations behind the browse surface.
//!
//! Every function here receives paths that already passed resolution
//! against a root snapshot; paths built from further client input are
//! checked again before any I/O.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    body::Body,
    extract::Multipart,
    extract::multipart::Field,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use tokio::fs;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};

use crate::archive::{ZipLimits, stream_archive};
use crate::error::ServeError;
use crate::listing::{ListingPage, ListingRenderer, read_listing};
use crate::markdown::{MarkdownRenderer, render_bytes};
use crate::paths::{clean_upload_path, is_single_segment, is_under_dir, leaf_name, resolve};

/// GET on a directory.
pub async fn list_directory(
    dir: PathBuf,
    url_path: &str,
    can_upload: bool,
    can_modify: bool,
    renderer: &dyn ListingRenderer,
) -> Result<Response, ServeError> {
    let listing_url = url_path.to_string();
    let entries = tokio::task::spawn_blocking(move || read_listing(&dir, &listing_url))
        .await
        .map_err(|err| ServeError::internal(err.to_string()))??;

    let page = ListingPage::new(url_path, entries, can_upload, can_modify);
    Ok(Html(renderer.render(&page)).into_response())
}

/// GET on a file: stream it without loading it into memory.
pub async fn serve_file(path: &Path) -> Result<Response, ServeError> {
    let file = fs::File::open(path).await?;
    let size = file.metadata().await?.len();

    let mime = mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().replace('"', "'"))
        .unwrap_or_else(|| "file".to_string());

    debug!("Serving file: {} ({} bytes)", path.display(), size);

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, mime),
            (header::CONTENT_LENGTH, size.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", file_name),
            ),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// `?markdown=1` on a markdown file.
pub async fn render_markdown(
    path: &Path,
    renderer: Arc<dyn MarkdownRenderer>,
) -> Result<Response, ServeError> {
    let bytes = fs::read(path).await?;
    // comrak and syntect are CPU bound
    let html = tokio::task::spawn_blocking(move || render_bytes(renderer.as_ref(), &bytes))
        .await
        .map_err(|err| ServeError::internal(err.to_string()))?;
    Ok(Html(html).into_response())
}

/// Outcome of a multipart upload that contained at least one file.
#[derive(Debug, Default)]
pub struct UploadSummary {
    pub saved: usize,
    pub failed: usize,
    pub last_error: Option<ServeError>,
}

/// `?upload=1`: save every `files` field under `dir`.
///
/// Each file fails on its own; the caller decides what a batch with
/// failures means.
pub async fn upload_files(
    dir: &Path,
    mut multipart: Multipart,
    max_file_size: u64,
) -> Result<UploadSummary, ServeError> {
    if !dir.is_dir() {
        return Err(ServeError::NotADirectory);
    }

    let mut summary = UploadSummary::default();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Multipart error while uploading to {}: {}", dir.display(), e);
                summary.failed += 1;
                summary.last_error = Some(ServeError::bad_request(e.body_text()));
                break;
            }
        };

        if field.name() != Some("files") {
            continue;
        }

        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };

        match save_upload(dir, &raw_name, field, max_file_size).await {
            Ok(path) => {
                info!("Uploaded file: {}", path.display());
                summary.saved += 1;
            }
            Err(e) => {
                warn!("Upload of {:?} failed: {}", raw_name, e);
                summary.failed += 1;
                summary.last_error = Some(e);
            }
        }
    }

    if summary.saved == 0 && summary.failed == 0 {
        return Err(ServeError::bad_request("No files uploaded"));
    }

    Ok(summary)
}

async fn save_upload(
    dir: &Path,
    raw_name: &str,
    mut field: Field<'_>,
    max_file_size: u64,
) -> Result<PathBuf, ServeError> {
    let relative = clean_upload_path(raw_name)?;
    let final_path = dir.join(&relative);
    if !is_under_dir(&final_path, dir) {
        return Err(ServeError::PathTraversal);
    }

    let parent_dir = final_path
        .parent()
        .ok_or_else(|| ServeError::bad_request("Missing parent directory"))?;
    fs::create_dir_all(parent_dir).await?;

    if final_path.is_dir() {
        return Err(ServeError::AlreadyExists(format!(
            "{} is a directory",
            relative.display()
        )));
    }

    let leaf = final_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = parent_dir.join(format!(".upload-{}-{}", leaf, nonce));

    let result = write_field(&temp_path, &mut field, max_file_size).await;
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, &final_path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(e.into());
    }

    Ok(final_path)
}

async fn write_field(
    temp_path: &Path,
    field: &mut Field<'_>,
    max_file_size: u64,
) -> Result<u64, ServeError> {
    let mut temp_file = fs::File::create(temp_path).await?;
    let mut total_size = 0u64;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ServeError::bad_request(e.body_text()))?
    {
        total_size = total_size.saturating_add(chunk.len() as u64);
        if total_size > max_file_size {
            return Err(ServeError::FileTooLarge {
                size: total_size,
                limit: max_file_size,
            });
        }
        temp_file.write_all(&chunk).await?;
    }
    temp_file.flush().await?;

    Ok(total_size)
}

/// `?delete=<path>`: remove a file or a directory tree.
///
/// A target that is already gone counts as deleted.
pub async fn delete_entry(root: &Path, target: &str) -> Result<(), ServeError> {
    let path = resolve(root, target)?;
    if path == root {
        warn!("Attempted to delete root directory");
        return Err(ServeError::bad_request("Cannot delete root directory"));
    }

    let metadata = match fs::symlink_metadata(&path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    info!("Deleting: {}", path.display());
    if metadata.is_dir() {
        fs::remove_dir_all(&path).await?;
    } else {
        fs::remove_file(&path).await?;
    }

    Ok(())
}

/// `?rename=<path>&newname=<name>`: rename within the same directory.
pub async fn rename_entry(root: &Path, target: &str, new_name: &str) -> Result<(), ServeError> {
    if new_name.is_empty() {
        return Err(ServeError::bad_request("Missing new name"));
    }
    if !is_single_segment(new_name) {
        return Err(ServeError::bad_request("Invalid new name"));
    }

    let old_path = resolve(root, target)?;
    if old_path == root {
        warn!("Attempted to rename root directory");
        return Err(ServeError::bad_request("Cannot rename root directory"));
    }

    let new_path = match old_path.parent() {
        Some(parent) => parent.join(new_name),
        None => return Err(ServeError::PathTraversal),
    };
    if !is_under_dir(&new_path, root) {
        warn!("Rename destination outside root: {:?}", new_path);
        return Err(ServeError::PathTraversal);
    }

    if fs::symlink_metadata(&new_path).await.is_ok() {
        return Err(ServeError::AlreadyExists(
            "Destination already exists".to_string(),
        ));
    }

    info!("Renaming: {} -> {}", old_path.display(), new_path.display());
    fs::rename(&old_path, &new_path).await?;

    Ok(())
}

/// `?mkdir=<name>`: create one directory inside `parent`.
pub async fn make_directory(parent: &Path, name: &str) -> Result<(), ServeError> {
    if !is_single_segment(name) {
        return Err(ServeError::bad_request("Invalid directory name"));
    }

    let new_path = parent.join(name);
    if !is_under_dir(&new_path, parent) {
        return Err(ServeError::PathTraversal);
    }

    if fs::symlink_metadata(&new_path).await.is_ok() {
        return Err(ServeError::AlreadyExists(
            "Directory already exists".to_string(),
        ));
    }

    info!("Creating directory: {}", new_path.display());
    fs::create_dir(&new_path).await?;

    Ok(())
}

/// `?edit=1`: replace the file contents with the request body.
pub async fn edit_file(path: &Path, content: &[u8], max_size: u64) -> Result<(), ServeError> {
    let size = content.len() as u64;
    if size > max_size {
        return Err(ServeError::FileTooLarge {
            size,
            limit: max_size,
        });
    }

    if path.is_dir() {
        return Err(ServeError::bad_request("Cannot edit a directory"));
    }

    info!("Writing file: {} ({} bytes)", path.display(), size);
    fs::write(path, content).await?;

    Ok(())
}

/// `?zip=1` on a directory.
pub async fn zip_directory(
    dir: PathBuf,
    url_path: &str,
    limits: ZipLimits,
) -> Result<Response, ServeError> {
    if !dir.is_dir() {
        return Err(ServeError::NotFound("Not found".to_string()));
    }

    let zip_name = match leaf_name(url_path) {
        Some(name) => format!("{}.zip", name),
        None => "download.zip".to_string(),
    };

    debug!("Downloading directory as zip: {}", dir.display());
    let stream = stream_archive(dir.clone(), vec![dir], limits).await?;
    Ok(zip_response(stream, &zip_name))
}

/// `?zipfiles=1`: zip the named children of `dir`.
///
/// Only the leaf of each name is used. Missing or invalid names are skipped.
pub async fn zip_selection(
    dir: PathBuf,
    names: &[String],
    limits: ZipLimits,
) -> Result<Response, ServeError> {
    if names.is_empty() {
        return Err(ServeError::bad_request("No files specified"));
    }

    let mut paths = Vec::new();
    for name in names {
        let Some(leaf) = leaf_name(name) else {
            debug!("Skipping zip selection {:?}", name);
            continue;
        };
        let Ok(path) = resolve(&dir, leaf) else {
            warn!("Skipping zip selection outside directory: {:?}", name);
            continue;
        };
        if path != dir && fs::symlink_metadata(&path).await.is_ok() && !paths.contains(&path) {
            paths.push(path);
        }
    }

    debug!("Downloading {} items as zip", paths.len());
    let stream = stream_archive(dir, paths, limits).await?;
    Ok(zip_response(stream, "download.zip"))
}

fn zip_response(stream: ReaderStream<DuplexStream>, zip_name: &str) -> Response {
    let safe_zip_name = zip_name.replace('"', "'");
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", safe_zip_name),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
