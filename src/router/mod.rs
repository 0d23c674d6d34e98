//! The browse surface: one handler for every path under the served root.
//!
//! Per request: snapshot the root, compute capabilities, resolve the path,
//! classify the request into one [`Operation`], check its capability, then
//! run it against the snapshot.

mod admin;
mod handlers;
mod operation;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use axum::{
    Form, Json,
    body::Bytes,
    extract::{FromRequest, Multipart, Query, Request, State, rejection::BytesRejection},
    http::{StatusCode, header},
    response::{IntoResponse, Redirect, Response},
};
use tracing::{debug, warn};

pub use admin::{ChdirRequest, ChdirResponse, chdir, is_loopback};
pub use handlers::UploadSummary;
pub use operation::{Operation, classify};

use crate::AppState;
use crate::archive::ZipLimits;
use crate::auth::{Capabilities, CurrentUser, capabilities};
use crate::config::Config;
use crate::error::{OperationResult, ServeError};
use crate::paths::{decode_url_path, resolve};

/// Fallback handler for everything that is not WebDAV or an API route.
pub async fn dispatch(State(state): State<AppState>, req: Request) -> Response {
    let root = state.registry.get();

    let identity = req.extensions().get::<CurrentUser>().map(|user| &user.0);
    let username = identity.map(|user| user.username.clone());
    let caps = match capabilities(identity, state.policy, state.auth_required()) {
        Ok(caps) => caps,
        Err(err) => return err.into_challenge(&state.config.realm),
    };

    let url_path = match decode_url_path(req.uri().path()) {
        Ok(path) => path,
        Err(err) => return err.into_response(),
    };

    let target = match resolve(&root, &url_path) {
        Ok(path) => path,
        Err(err) => return err.into_response(),
    };

    let query: HashMap<String, String> = Query::try_from_uri(req.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();

    let operation = match classify(req.method(), &query, &target) {
        Ok(operation) => operation,
        Err(err) => return err.into_response(),
    };

    let required = operation.required_capability();
    if !caps.allows(required) {
        warn!(
            "{} on {} denied for {}",
            operation.name(),
            url_path,
            username.as_deref().unwrap_or("anonymous")
        );
        let err = ServeError::forbidden(format!("{} not allowed", operation.name()));
        return if operation.is_json() {
            err.into_json_response()
        } else {
            err.into_response()
        };
    }

    debug!(
        "{} {} as {} ({})",
        req.method(),
        url_path,
        operation.name(),
        username.as_deref().unwrap_or("anonymous")
    );

    let is_json = operation.is_json();
    let result = execute(&state, operation, &root, target, &url_path, caps, req).await;

    match (result, is_json) {
        (Ok(response), _) => response,
        (Err(err), true) => err.into_json_response(),
        (Err(err), false) => err.into_response(),
    }
}

async fn execute(
    state: &AppState,
    operation: Operation,
    root: &Path,
    target: PathBuf,
    url_path: &str,
    caps: Capabilities,
    req: Request,
) -> Result<Response, ServeError> {
    let limits = ZipLimits::from_config(&state.config);

    match operation {
        Operation::Upload => {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ServeError::bad_request(e.body_text()))?;
            let summary =
                handlers::upload_files(&target, multipart, state.config.max_upload_size).await?;
            Ok(upload_response(summary, url_path))
        }
        Operation::Delete { target } => {
            handlers::delete_entry(root, &target).await?;
            Ok(json_ok())
        }
        Operation::Rename { target, new_name } => {
            handlers::rename_entry(root, &target, &new_name).await?;
            Ok(json_ok())
        }
        Operation::Mkdir { name } => {
            handlers::make_directory(&target, &name).await?;
            Ok(json_ok())
        }
        Operation::Edit => {
            let declared = req
                .headers()
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = Bytes::from_request(req, state)
                .await
                .map_err(|rejection| edit_body_error(rejection, declared, &state.config))?;
            handlers::edit_file(&target, &body, state.config.max_upload_size).await?;
            Ok(json_ok())
        }
        Operation::Zip => handlers::zip_directory(target, url_path, limits).await,
        Operation::ZipFiles => {
            let Form(fields) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ServeError::bad_request(e.body_text()))?;
            let names: Vec<String> = fields
                .into_iter()
                .filter(|(key, _)| key == "files")
                .map(|(_, value)| value)
                .collect();
            handlers::zip_selection(target, &names, limits).await
        }
        Operation::Markdown => handlers::render_markdown(&target, state.markdown.clone()).await,
        Operation::View => {
            let metadata = tokio::fs::metadata(&target)
                .await
                .map_err(|_| ServeError::NotFound(url_path.to_string()))?;
            if metadata.is_dir() {
                handlers::list_directory(
                    target,
                    url_path,
                    caps.can_upload,
                    caps.can_modify,
                    state.listing.as_ref(),
                )
                .await
            } else {
                handlers::serve_file(&target).await
            }
        }
    }
}

/// A body over the request limit is reported like any other oversized edit.
fn edit_body_error(
    rejection: BytesRejection,
    declared: Option<u64>,
    config: &Config,
) -> ServeError {
    if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServeError::FileTooLarge {
            size: declared.unwrap_or_else(|| config.max_request_size().saturating_add(1)),
            limit: config.max_upload_size,
        }
    } else {
        ServeError::bad_request("Failed to read content")
    }
}

fn json_ok() -> Response {
    Json(OperationResult::ok()).into_response()
}

/// Any saved file makes the batch a success; failures alongside it are
/// dropped.
fn upload_response(summary: UploadSummary, url_path: &str) -> Response {
    if summary.saved == 0 {
        let reason = summary
            .last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no file could be saved".to_string());
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Upload failed: {}", reason),
        )
            .into_response();
    }

    if summary.failed > 0 {
        debug!(
            "Upload to {} saved {} file(s), dropped {}",
            url_path, summary.saved, summary.failed
        );
    }

    Redirect::to(&redirect_target(url_path)).into_response()
}

fn redirect_target(url_path: &str) -> String {
    url_path
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_redirects_on_partial_success() {
        let summary = UploadSummary {
            saved: 1,
            failed: 2,
            last_error: Some(ServeError::bad_request("invalid path: ../x")),
        };
        let response = upload_response(summary, "/docs/my files");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/docs/my%20files"
        );
    }

    #[test]
    fn test_upload_response_fails_when_nothing_saved() {
        let summary = UploadSummary {
            saved: 0,
            failed: 1,
            last_error: Some(ServeError::FileTooLarge { size: 10, limit: 5 }),
        };
        let response = upload_response(summary, "/");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
