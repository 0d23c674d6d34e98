//! WebDAV endpoint bound to the current served root.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::AppState;
use crate::auth::{Capability, CurrentUser, capabilities};

/// Capability a WebDAV request needs. Unknown methods need the strictest one.
///
/// COPY may replace its destination unless the client sends `Overwrite: F`.
pub fn required_capability(method: &Method, headers: &HeaderMap) -> Capability {
    match method.as_str() {
        "GET" | "HEAD" | "OPTIONS" | "PROPFIND" => Capability::Read,
        "COPY" if !forbids_overwrite(headers) => Capability::Modify,
        "PUT" | "MKCOL" | "COPY" | "LOCK" | "UNLOCK" => Capability::Upload,
        _ => Capability::Modify,
    }
}

fn forbids_overwrite(headers: &HeaderMap) -> bool {
    headers
        .get("Overwrite")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("F"))
}

/// Forward a request under `/webdav` to the handler for the current root.
pub async fn webdav_handler(State(state): State<AppState>, req: Request) -> Response {
    let served = state.registry.snapshot();

    let identity = req.extensions().get::<CurrentUser>().map(|user| &user.0);
    let caps = match capabilities(identity, state.policy, state.auth_required()) {
        Ok(caps) => caps,
        Err(err) => return err.into_challenge(&state.config.realm),
    };

    let required = required_capability(req.method(), req.headers());
    if !caps.allows(required) {
        warn!(
            "WebDAV {} {} denied: {:?} not allowed",
            req.method(),
            req.uri().path(),
            required
        );
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }

    debug!("WebDAV {} {}", req.method(), req.uri().path());
    served.dav.handle(req).await.map(Body::new)
}
