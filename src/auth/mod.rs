//! Authentication and authorization for wicket
//!
//! Provides:
//! - Caller credentials resolved by the transport collaborator
//! - Per-operation authorization and response redaction
//! - Password hashing with PBKDF2-HMAC-SHA-512

pub mod credentials;
pub mod guard;
pub mod password;

pub use credentials::{Credentials, RequestContext};
pub use guard::{authorize, must_redact, redact, Decision, GuardPolicy, Operation};
pub use password::{hash_password, hash_password_task, verify_password, HashMaterial};
