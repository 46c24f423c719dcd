//! wicket - access-control gateway for user identity records
//!
//! wicket sits between network clients and a keyed document store,
//! specialized for a "users" collection. It decides who may create, read,
//! update, or search identity records; guarantees password material is
//! never persisted or returned in plaintext; blocks privilege escalation
//! through update documents; and keeps logins canonical and unique.
//!
//! ## Pipeline
//!
//! Every operation runs authorize → sanitize → validate login → hash →
//! persist → redact, short-circuiting on the first failure. The storage
//! engine behind [`db::DocumentStore`] and the upstream router that
//! resolves caller credentials are external collaborators.

pub mod auth;
pub mod config;
pub mod db;
pub mod login;
pub mod routes;
pub mod sanitize;
pub mod server;
pub mod service;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Error, Result};
