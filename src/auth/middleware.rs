//! Basic authentication gate.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::{debug, warn};

use super::{AuthError, Identity};
use crate::AppState;

/// The authenticated caller, inserted into request extensions by [`auth_gate`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

/// Decode a `Basic` Authorization header value into username and password.
pub fn basic_credentials_from_header(header_value: &str) -> Result<(String, String), AuthError> {
    let (scheme, encoded) = header_value
        .trim()
        .split_once(' ')
        .ok_or(AuthError::InvalidAuthHeader)?;

    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::InvalidAuthHeader);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::InvalidAuthHeader)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidAuthHeader)?;

    let (username, password) = decoded
        .split_once(':')
        .ok_or(AuthError::InvalidAuthHeader)?;

    Ok((username.to_string(), password.to_string()))
}

/// Gate in front of every route when a credentials file is configured.
///
/// Without a user store the request passes through untouched.
pub async fn auth_gate(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(users) = state.users.as_ref() else {
        return next.run(req).await;
    };

    let credentials = match req
        .headers()
        .get(AUTHORIZATION)
        .map(|value| value.to_str().map_err(|_| AuthError::InvalidAuthHeader))
    {
        None => Err(AuthError::MissingCredentials),
        Some(Err(err)) => Err(err),
        Some(Ok(value)) => basic_credentials_from_header(value),
    };

    let identity = match credentials {
        Ok((username, password)) => match users.identify(Some((username.as_str(), password.as_str()))) {
            Some(identity) => identity.clone(),
            None => {
                warn!("Failed login for user {:?} on {}", username, req.uri().path());
                return AuthError::InvalidCredentials.into_challenge(&state.config.realm);
            }
        },
        Err(err) => {
            debug!("Rejecting {} {}: {}", req.method(), req.uri().path(), err);
            return err.into_challenge(&state.config.realm);
        }
    };

    debug!("Authenticated {} as {}", identity.username, identity.level);
    req.extensions_mut().insert(CurrentUser(identity));
    next.run(req).await
}
