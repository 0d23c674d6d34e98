//! Authentication errors.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Authentication errors. All of them end the request with a 401 challenge.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials were sent.
    #[error("missing credentials")]
    MissingCredentials,

    /// Authorization header present but not usable Basic credentials.
    #[error("invalid authorization header")]
    InvalidAuthHeader,

    /// Unknown user or wrong password.
    #[error("invalid credentials")]
    InvalidCredentials,
}

impl AuthError {
    /// 401 response carrying a Basic challenge for `realm`.
    ///
    /// The body is the same for every variant so callers learn nothing about
    /// which check failed.
    pub fn into_challenge(self, realm: &str) -> Response {
        let challenge = format!("Basic realm=\"{}\"", realm.replace('"', "'"));
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, challenge)],
            "Unauthorized",
        )
            .into_response()
    }
}
