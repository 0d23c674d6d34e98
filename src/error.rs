use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Path is outside root directory")]
    PathTraversal,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("{0}")]
    AlreadyExists(String),

    #[error("Directory operation not allowed on file")]
    NotADirectory,

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Zip too large: {size} bytes exceeds limit of {limit} bytes")]
    ZipTooLarge { size: u64, limit: u64 },

    #[error("Zip has too many entries: {entries} exceeds limit of {limit}")]
    ZipTooManyEntries { entries: u64, limit: u64 },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServeError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) | Self::PathTraversal => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) | Self::NotADirectory => StatusCode::BAD_REQUEST,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::AlreadyExists(_) => StatusCode::CONFLICT,
            Self::FileTooLarge { .. } | Self::ZipTooLarge { .. } | Self::ZipTooManyEntries { .. } => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Render the failure for the JSON mutation endpoints.
    ///
    /// Filesystem failures are reported in the body with HTTP 200 so clients
    /// can always inspect `success`; authorization and request-shape failures
    /// keep their status code.
    pub fn into_json_response(self) -> Response {
        let status = match &self {
            Self::Forbidden(_)
            | Self::PathTraversal
            | Self::BadRequest(_)
            | Self::NotFound(_)
            | Self::MethodNotAllowed => self.status_code(),
            _ => StatusCode::OK,
        };

        (status, Json(OperationResult::failure(self.to_string()))).into_response()
    }
}

/// Body of the JSON mutation endpoints.
#[derive(Debug, Serialize)]
pub struct OperationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OperationResult {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            // Never echo internal paths back for traversal attempts.
            Self::PathTraversal => "Forbidden".to_string(),
            other => other.to_string(),
        };

        (status, message).into_response()
    }
}

/// Errors raised while bringing the server up.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("cannot listen on {addr}: {addr} is already in use by another application")]
    AddressInUse { addr: String },

    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid root directory {path}: {reason}")]
    InvalidRoot { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StartupError {
    pub fn from_bind_error(addr: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::AddrInUse {
            Self::AddressInUse {
                addr: addr.to_string(),
            }
        } else {
            Self::Bind {
                addr: addr.to_string(),
                source,
            }
        }
    }
}
