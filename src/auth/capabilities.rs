//! Effective capability computation.

use crate::config::StaticPolicy;

use super::{AuthError, Identity, PermissionLevel};

/// A right an operation needs before it may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    Read,
    Upload,
    Modify,
}

/// Rights effective for one request. Read is implicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub can_upload: bool,
    pub can_modify: bool,
}

impl Capabilities {
    pub fn allows(&self, required: Capability) -> bool {
        match required {
            Capability::Read => true,
            Capability::Upload => self.can_upload,
            Capability::Modify => self.can_modify,
        }
    }
}

/// Combine the server-wide policy with the caller's identity.
///
/// With authentication required, a missing identity is an error; otherwise
/// the identity's level can only narrow the policy, never widen it.
pub fn capabilities(
    identity: Option<&Identity>,
    policy: StaticPolicy,
    auth_required: bool,
) -> Result<Capabilities, AuthError> {
    let base = Capabilities {
        can_upload: policy.allow_upload,
        can_modify: policy.allow_modify,
    };

    if !auth_required {
        return Ok(base);
    }

    let identity = identity.ok_or(AuthError::MissingCredentials)?;

    Ok(match identity.level {
        PermissionLevel::ReadOnly => Capabilities {
            can_upload: false,
            can_modify: false,
        },
        PermissionLevel::ReadWrite => Capabilities {
            can_upload: base.can_upload,
            can_modify: false,
        },
        PermissionLevel::All => base,
    })
}
