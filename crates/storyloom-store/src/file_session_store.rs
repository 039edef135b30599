//! JSON file implementation of the `SessionStore` trait.
//!
//! Saves go to a sibling temporary file that is renamed over the target, so
//! a crash mid-write leaves the previous library intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use storyloom_core::error::DomainError;
use storyloom_core::store::SessionStore;

/// File-backed session store.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    /// Creates a store that reads and writes `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The library file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn io_error(path: &Path, err: &std::io::Error) -> DomainError {
    DomainError::Infrastructure(format!("{}: {err}", path.display()))
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn load(&self) -> Result<Option<serde_json::Value>, DomainError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no session library file yet");
                return Ok(None);
            }
            Err(err) => return Err(io_error(&self.path, &err)),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| DomainError::Import(format!("{}: {e}", self.path.display())))
    }

    async fn save(&self, library: &serde_json::Value) -> Result<(), DomainError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, &e))?;
        }
        let bytes = serde_json::to_vec_pretty(library)
            .map_err(|e| DomainError::Infrastructure(e.to_string()))?;
        let temp = self.temp_path();
        fs::write(&temp, bytes)
            .await
            .map_err(|e| io_error(&temp, &e))?;
        fs::rename(&temp, &self.path)
            .await
            .map_err(|e| io_error(&self.path, &e))?;
        debug!(path = %self.path.display(), "saved session library");
        Ok(())
    }
}
