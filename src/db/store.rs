//! Backend contract for the keyed document store
//!
//! The storage engine is an external collaborator; this trait is the whole
//! of what the access-control layer requires from it. Swappable so tests
//! can run against an in-memory double.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::Result;

/// Narrow contract over a keyed document backend.
///
/// Records are schemaless JSON documents keyed by canonical login. `find`
/// distinguishes "nothing matched" (`Error::NotFound`) from transport
/// failures (`Error::Database`).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new record and echo it back. `Error::Conflict` when the
    /// login is already taken (the backend's unique index is authoritative).
    async fn create(&self, doc: Value) -> Result<Value>;

    /// Fetch a record by canonical login. `Error::NotFound` when absent.
    async fn get(&self, login: &str) -> Result<Value>;

    /// Apply a whole-document or operator-style update and return the
    /// post-image. `Error::NotFound` when no record matches.
    async fn update(&self, login: &str, update: Value) -> Result<Value>;

    /// Delete a record and echo the removed document.
    async fn delete(&self, login: &str) -> Result<Value>;

    /// Find records matching a filter. `Error::NotFound` when nothing
    /// matches; a returned vector is never empty.
    async fn find(&self, filter: Value) -> Result<Vec<Value>>;
}
