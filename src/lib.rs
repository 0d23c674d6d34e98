//! Directory sharing server.
//!
//! Serves one directory tree for browsing, preview, upload and in-place
//! edits, and the same tree over WebDAV, behind optional Basic auth with
//! per-user permission levels. The served root can be switched at runtime.

pub mod archive;
pub mod auth;
pub mod config;
pub mod error;
pub mod listing;
pub mod markdown;
pub mod paths;
pub mod root;
pub mod router;
pub mod routes;
pub mod webdav;

use std::sync::Arc;

pub use config::{Config, StaticPolicy};
pub use error::{ServeError, StartupError};
pub use root::RootRegistry;

use auth::UserStore;
use listing::{HtmlListing, ListingRenderer};
use markdown::{ComrakRenderer, MarkdownRenderer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Current served root and its WebDAV handler
    pub registry: Arc<RootRegistry>,
    /// Configuration
    pub config: Arc<Config>,
    /// Server-wide upload/modify flags
    pub policy: StaticPolicy,
    /// Loaded credentials; `None` disables authentication
    pub users: Option<Arc<UserStore>>,
    pub listing: Arc<dyn ListingRenderer>,
    pub markdown: Arc<dyn MarkdownRenderer>,
}

impl AppState {
    /// Create state with the built-in listing page and markdown renderer.
    pub fn new(
        registry: RootRegistry,
        config: Config,
        policy: StaticPolicy,
        users: Option<UserStore>,
    ) -> Self {
        let markdown = ComrakRenderer::new(&config.markdown_theme);
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            policy,
            users: users.map(Arc::new),
            listing: Arc::new(HtmlListing),
            markdown: Arc::new(markdown),
        }
    }

    /// Replace the listing page renderer.
    pub fn with_listing(mut self, listing: impl ListingRenderer + 'static) -> Self {
        self.listing = Arc::new(listing);
        self
    }

    /// Replace the markdown renderer.
    pub fn with_markdown(mut self, markdown: impl MarkdownRenderer + 'static) -> Self {
        self.markdown = Arc::new(markdown);
        self
    }

    pub fn auth_required(&self) -> bool {
        self.users.is_some()
    }
}
