//! `POST /_api/chdir`: switch the served root at runtime.

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::root::RootError;

const MAX_CHDIR_BODY: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct ChdirRequest {
    pub dir: String,
}

#[derive(Debug, Serialize)]
pub struct ChdirResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ChdirResponse {
    fn changed(dir: String) -> Self {
        Self {
            success: true,
            dir: Some(dir),
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            dir: None,
            error: Some(error.into()),
        }
    }
}

pub fn is_loopback(addr: &SocketAddr) -> bool {
    addr.ip().is_loopback()
        || match addr.ip() {
            std::net::IpAddr::V6(v6) => v6.to_ipv4_mapped().is_some_and(|v4| v4.is_loopback()),
            std::net::IpAddr::V4(_) => false,
        }
}

/// Whether the caller may change the root.
///
/// With authentication configured only `all` users may; without it only
/// loopback peers may.
fn authorize(state: &AppState, req: &Request) -> Result<(), &'static str> {
    if !state.config.allow_root_change {
        return Err("Root change disabled");
    }

    if state.auth_required() {
        return match req.extensions().get::<CurrentUser>() {
            Some(CurrentUser(identity)) if identity.is_admin() => Ok(()),
            _ => Err("Root change not allowed"),
        };
    }

    match req.extensions().get::<ConnectInfo<SocketAddr>>() {
        Some(ConnectInfo(addr)) if is_loopback(addr) => Ok(()),
        _ => Err("Root change only allowed from localhost"),
    }
}

pub async fn chdir(State(state): State<AppState>, req: Request) -> Response {
    if let Err(reason) = authorize(&state, &req) {
        warn!("Rejected root change: {}", reason);
        return (
            StatusCode::FORBIDDEN,
            Json(ChdirResponse::failed(reason)),
        )
            .into_response();
    }

    let body = match axum::body::to_bytes(req.into_body(), MAX_CHDIR_BODY).await {
        Ok(body) => body,
        Err(_) => return Json(ChdirResponse::failed("Invalid request")).into_response(),
    };

    let request: ChdirRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(_) => return Json(ChdirResponse::failed("Invalid request")).into_response(),
    };
    if request.dir.trim().is_empty() {
        return Json(ChdirResponse::failed("Invalid request")).into_response();
    }

    match state.registry.set(&request.dir) {
        Ok(new_root) => {
            info!("Serving {} (requested {:?})", new_root.display(), request.dir);
            Json(ChdirResponse::changed(new_root.display().to_string())).into_response()
        }
        Err(RootError::NotFound | RootError::NotADirectory) => {
            Json(ChdirResponse::failed("Directory does not exist")).into_response()
        }
        Err(err) => Json(ChdirResponse::failed(err.to_string())).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_loopback() {
        assert!(is_loopback(&"127.0.0.1:8080".parse().unwrap()));
        assert!(is_loopback(&"[::1]:8080".parse().unwrap()));
        assert!(is_loopback(&"[::ffff:127.0.0.1]:8080".parse().unwrap()));
        assert!(!is_loopback(&"192.168.1.20:8080".parse().unwrap()));
        assert!(!is_loopback(&"[2001:db8::1]:8080".parse().unwrap()));
    }

    #[test]
    fn test_chdir_response_shape() {
        let ok = serde_json::to_value(ChdirResponse::changed("/srv".to_string())).unwrap();
        assert_eq!(ok, serde_json::json!({"success": true, "dir": "/srv"}));

        let failed = serde_json::to_value(ChdirResponse::failed("nope")).unwrap();
        assert_eq!(failed, serde_json::json!({"success": false, "error": "nope"}));
    }
}
