//! Per-operation authorization and response redaction
//!
//! Rules, per operation:
//! - GET/PUT: credential-less callers, the admin role, the record owner,
//!   or (GET only) a pre-authorized "search" capability.
//! - POST: admin role or credential-less callers only.
//! - SEARCH: admin-only while the restricted-search policy flag is on.
//! - DELETE: authorization belongs to the backend; only redaction applies.
//!
//! Redaction is decided independently of allow/deny: `hash` is stripped for
//! every caller that presents credentials; only credential-less internal
//! calls see it.

use serde_json::Value;
use std::fmt;

use crate::auth::credentials::Credentials;
use crate::config::Args;
use crate::login;
use crate::types::Error;

/// Operations governed by the guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Create,
    Update,
    Search,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Get => write!(f, "GET"),
            Operation::Create => write!(f, "POST"),
            Operation::Update => write!(f, "PUT"),
            Operation::Search => write!(f, "SEARCH"),
            Operation::Delete => write!(f, "DELETE"),
        }
    }
}

/// Outcome of an authorization check.
#[derive(Debug)]
pub enum Decision {
    Allow,
    AllowWithRedaction,
    Deny(Error),
}

impl Decision {
    /// Turn the decision into a result, keeping the redaction flag.
    pub fn into_result(self) -> Result<bool, Error> {
        match self {
            Decision::Allow => Ok(false),
            Decision::AllowWithRedaction => Ok(true),
            Decision::Deny(err) => Err(err),
        }
    }
}

/// Read-only guard policy, fixed at process start.
#[derive(Debug, Clone)]
pub struct GuardPolicy {
    /// Role value allowed to bypass per-owner restrictions.
    pub admin_role: String,
    /// Restrict SEARCH to the admin role.
    pub restricted_search: bool,
}

impl GuardPolicy {
    pub fn from_args(args: &Args) -> Self {
        Self {
            admin_role: args.admin_role.clone(),
            restricted_search: args.restricted_search,
        }
    }

    fn is_admin(&self, credentials: &Credentials) -> bool {
        credentials.role.as_deref() == Some(self.admin_role.as_str())
    }
}

/// Whether `hash` must be stripped from records returned to this caller.
///
/// Only a caller presenting no credentials at all (trusted internal call)
/// and no pre-authorized capability is exempt.
pub fn must_redact(credentials: Option<&Credentials>) -> bool {
    match credentials {
        None => false,
        Some(c) => {
            c.username.is_some() || c.role.is_some() || !c.authorized_methods.is_empty()
        }
    }
}

/// Remove `hash` from an outbound record.
pub fn redact(record: &mut Value) {
    if let Some(map) = record.as_object_mut() {
        map.remove("hash");
    }
}

/// Decide whether `operation` on `target` is permitted for this caller.
pub fn authorize(
    operation: Operation,
    credentials: Option<&Credentials>,
    target: Option<&str>,
    policy: &GuardPolicy,
) -> Decision {
    let redacted = must_redact(credentials);
    let allow = || {
        if redacted {
            Decision::AllowWithRedaction
        } else {
            Decision::Allow
        }
    };

    let Some(creds) = credentials else {
        // Trusted internal call: nothing to check, nothing to redact.
        return Decision::Allow;
    };

    match operation {
        Operation::Get | Operation::Update => {
            if policy.is_admin(creds) {
                return allow();
            }

            // Callers without a username (scoped service tokens) are not
            // subject to the ownership check.
            let Some(ref username) = creds.username else {
                return allow();
            };

            let owns_target = target
                .map(|t| login::normalize(username) == login::normalize(t))
                .unwrap_or(false);
            if owns_target {
                return allow();
            }

            if operation == Operation::Get && creds.is_authorized_for("search") {
                return allow();
            }

            Decision::Deny(Error::AccessViolation(
                "no right to access another user's record".to_string(),
            ))
        }

        Operation::Create => {
            if policy.is_admin(creds) {
                allow()
            } else {
                Decision::Deny(Error::AccessViolation(
                    "no right to create users".to_string(),
                ))
            }
        }

        Operation::Search => {
            if policy.restricted_search && !policy.is_admin(creds) {
                Decision::Deny(Error::AccessViolation(
                    "no right to search users".to_string(),
                ))
            } else {
                allow()
            }
        }

        // The backend enforces its own delete authorization; the guard only
        // governs redaction of the echoed record.
        Operation::Delete => allow(),
    }
}
