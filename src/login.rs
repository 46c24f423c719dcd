//! Login canonicalization, validation and uniqueness
//!
//! Every comparison, storage key and backend query uses the canonical
//! (lowercase) form; this is what makes ownership checks and uniqueness
//! hold across the system.

use serde_json::json;

use crate::config::Args;
use crate::db::DocumentStore;
use crate::types::{Error, Result};

/// Canonical form of a login: the whole string lowercased.
pub fn normalize(login: &str) -> String {
    login.to_lowercase()
}

/// Length bounds for accepted logins, fixed at process start.
#[derive(Debug, Clone, Copy)]
pub struct LoginPolicy {
    pub min_len: usize,
    pub max_len: usize,
}

impl LoginPolicy {
    pub fn from_args(args: &Args) -> Self {
        Self {
            min_len: args.login_min_len,
            max_len: args.login_max_len,
        }
    }
}

/// Check a canonical login against the configured length bounds.
pub fn validate(login: &str, policy: &LoginPolicy) -> Result<()> {
    let len = login.chars().count();
    if len < policy.min_len {
        return Err(Error::Validation(format!(
            "login must be at least {} characters",
            policy.min_len
        )));
    }
    if len > policy.max_len {
        return Err(Error::Validation(format!(
            "login must be at most {} characters",
            policy.max_len
        )));
    }
    Ok(())
}

/// Reject a login that already exists in the backend.
///
/// This is an early rejection, not the authoritative guard: two concurrent
/// creates can both pass here, and the backend's unique index decides.
pub async fn ensure_unique(store: &dyn DocumentStore, login: &str) -> Result<()> {
    match store.find(json!({ "login": login })).await {
        Ok(_) => Err(Error::Conflict("login already taken".to_string())),
        Err(Error::NotFound) => Ok(()),
        Err(err) => Err(err),
    }
}

/// Canonicalize, validate and uniqueness-check a login being introduced or
/// changed. Returns the canonical form.
pub async fn normalize_and_validate(
    store: &dyn DocumentStore,
    login: &str,
    policy: &LoginPolicy,
) -> Result<String> {
    let canonical = normalize(login);
    validate(&canonical, policy)?;
    ensure_unique(store, &canonical).await?;
    Ok(canonical)
}
