//! Authentication and authorization.
//!
//! - `users`: credentials file loading and identity lookup
//! - `capabilities`: effective upload/modify rights for a request
//! - `middleware`: the Basic auth gate in front of the router and WebDAV

mod capabilities;
mod error;
mod middleware;
mod users;

pub use capabilities::{Capabilities, Capability, capabilities};
pub use error::AuthError;
pub use middleware::{CurrentUser, auth_gate, basic_credentials_from_header};
pub use users::{Identity, PermissionLevel, UserStore, UserStoreError};
