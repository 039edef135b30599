//! Encoding of the whole session library for a [`SessionStore`].
//!
//! [`SessionStore`]: storyloom_core::store::SessionStore

use serde::{Deserialize, Serialize};
use storyloom_core::clock::Clock;
use storyloom_core::error::DomainError;
use tracing::warn;

use crate::domain::record::SessionRecord;
use crate::domain::session::Session;

/// Current library layout version.
pub const LIBRARY_VERSION: u32 = 1;

#[derive(Serialize)]
struct LibraryOut<'a> {
    version: u32,
    sessions: &'a [SessionRecord],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LibraryIn {
    Versioned {
        #[serde(default)]
        version: u32,
        sessions: Vec<serde_json::Value>,
    },
    // Early builds saved a bare list.
    Bare(Vec<serde_json::Value>),
}

/// Encodes sessions as a library blob.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if serialization fails.
pub fn encode_library<'a>(
    sessions: impl IntoIterator<Item = &'a Session>,
) -> Result<serde_json::Value, DomainError> {
    let records: Vec<SessionRecord> = sessions.into_iter().map(SessionRecord::from).collect();
    serde_json::to_value(LibraryOut {
        version: LIBRARY_VERSION,
        sessions: &records,
    })
    .map_err(|e| DomainError::Infrastructure(format!("session library serialization failed: {e}")))
}

/// Decodes a library blob. Records that cannot be decoded are skipped and
/// logged so one damaged session does not lose the rest.
///
/// # Errors
///
/// Returns `DomainError::Import` if the blob is not a session library at
/// all or was written by a newer version.
pub fn decode_library(
    blob: serde_json::Value,
    clock: &dyn Clock,
) -> Result<Vec<Session>, DomainError> {
    let raw = match serde_json::from_value(blob)
        .map_err(|e| DomainError::Import(format!("unrecognised session library: {e}")))?
    {
        LibraryIn::Versioned { version, sessions } => {
            if version > LIBRARY_VERSION {
                return Err(DomainError::Import(format!(
                    "session library version {version} is newer than supported version {LIBRARY_VERSION}"
                )));
            }
            sessions
        }
        LibraryIn::Bare(sessions) => sessions,
    };

    let mut sessions = Vec::with_capacity(raw.len());
    for (index, value) in raw.into_iter().enumerate() {
        match serde_json::from_value::<SessionRecord>(value) {
            Ok(record) => sessions.push(record.into_session(clock)),
            Err(error) => warn!(index, %error, "skipping unreadable session record"),
        }
    }
    Ok(sessions)
}
