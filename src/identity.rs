//! Identity capability: who is submitting the batch.
//!
//! Used only at the admission boundary to pick the upload quota.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityInfo {
    pub authenticated: bool,
    pub display_name: Option<String>,
}

/// Source of the current user's identity
pub trait Identity: Send + Sync {
    fn current_identity(&self) -> IdentityInfo;
}

/// Fixed identity, resolved once (e.g. from a CLI flag)
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity(IdentityInfo);

impl StaticIdentity {
    pub fn anonymous() -> Self {
        Self(IdentityInfo::default())
    }

    pub fn authenticated(display_name: impl Into<String>) -> Self {
        Self(IdentityInfo {
            authenticated: true,
            display_name: Some(display_name.into()),
        })
    }
}

impl Identity for StaticIdentity {
    fn current_identity(&self) -> IdentityInfo {
        self.0.clone()
    }
}
