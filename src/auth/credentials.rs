//! Caller identity resolved by the transport collaborator
//!
//! Credentials are ephemeral: derived per request from the upstream
//! router's token resolution and never persisted here. A request carrying
//! no credentials at all is the trusted service-to-service path.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Identity of the caller for one request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    /// Login of the authenticated caller, absent for service tokens.
    pub username: Option<String>,
    /// Role of the authenticated caller, absent for service tokens.
    pub role: Option<String>,
    /// Operation names this caller is pre-authorized for (e.g. a scoped
    /// "search" capability).
    #[serde(default)]
    pub authorized_methods: HashSet<String>,
}

impl Credentials {
    /// Whether the caller holds a pre-authorized capability for `method`.
    pub fn is_authorized_for(&self, method: &str) -> bool {
        self.authorized_methods.contains(method)
    }
}

/// Per-request context handed to the orchestrator by the transport.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Resolved caller credentials; `None` for trusted internal calls.
    pub credentials: Option<Credentials>,
    /// Target login extracted from the request path, if any.
    pub target: Option<String>,
}

impl RequestContext {
    /// Context for a trusted internal call with no credentials.
    pub fn internal() -> Self {
        Self::default()
    }

    /// Context addressing a specific login.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Context for an authenticated caller.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}
