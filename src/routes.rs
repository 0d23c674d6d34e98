use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{any, post},
};
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;
use crate::auth::auth_gate;
use crate::router;
use crate::webdav::webdav_handler;

/// WebDAV mount: `/webdav` and everything below it.
pub fn webdav_routes() -> Router<AppState> {
    Router::new()
        .route("/webdav", any(webdav_handler))
        .route("/webdav/", any(webdav_handler))
        .route("/webdav/{*path}", any(webdav_handler))
}

/// Browse surface: admin API plus the catch-all path handler.
pub fn browse_routes() -> Router<AppState> {
    Router::new()
        .route("/_api/chdir", post(router::chdir))
        .fallback(router::dispatch)
        .layer(CompressionLayer::new())
}

/// Full application with auth, body limits and request tracing.
pub fn app(state: AppState) -> Router {
    let body_limit = usize::try_from(state.config.max_request_size()).unwrap_or(usize::MAX);

    Router::new()
        .merge(webdav_routes())
        .merge(browse_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn_with_state(state.clone(), auth_gate))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
