//! Test session stores: mock `SessionStore` implementations for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use storyloom_core::error::DomainError;
use storyloom_core::store::SessionStore;

/// A session store that keeps the library in memory and counts saves.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    library: Mutex<Option<serde_json::Value>>,
    saves: Mutex<usize>,
}

impl InMemorySessionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `library`, e.g. a legacy blob.
    #[must_use]
    pub fn with_library(library: serde_json::Value) -> Self {
        Self {
            library: Mutex::new(Some(library)),
            saves: Mutex::new(0),
        }
    }

    /// The most recently saved library.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn library(&self) -> Option<serde_json::Value> {
        self.library.lock().unwrap().clone()
    }

    /// Number of `save` calls.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self) -> Result<Option<serde_json::Value>, DomainError> {
        Ok(self.library.lock().unwrap().clone())
    }

    async fn save(&self, library: &serde_json::Value) -> Result<(), DomainError> {
        *self.library.lock().unwrap() = Some(library.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

/// A session store that always returns an infrastructure error. Useful for
/// testing error-handling paths.
#[derive(Debug)]
pub struct FailingSessionStore;

#[async_trait]
impl SessionStore for FailingSessionStore {
    async fn load(&self) -> Result<Option<serde_json::Value>, DomainError> {
        Err(DomainError::Infrastructure("disk unavailable".into()))
    }

    async fn save(&self, _library: &serde_json::Value) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("disk unavailable".into()))
    }
}
