//! Session store abstraction.
//!
//! Storage treats the session library as an opaque JSON blob; encoding and
//! decoding of individual sessions lives in the session crate.

use async_trait::async_trait;

use crate::error::DomainError;

/// Repository trait for loading and saving the whole session library.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Loads the persisted library, or `None` if nothing was saved yet.
    async fn load(&self) -> Result<Option<serde_json::Value>, DomainError>;

    /// Replaces the persisted library with `library`.
    async fn save(&self, library: &serde_json::Value) -> Result<(), DomainError>;
}
