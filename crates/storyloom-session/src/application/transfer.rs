//! YAML export and import of single sessions.
//!
//! An export carries a format version and a SHA-256 checksum of the session
//! body. Import validates the whole document before anything is built and
//! always assigns a fresh session id. Documents that only hold a flat
//! `messages` list are converted into a single-chain tree.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use storyloom_core::clock::Clock;
use storyloom_core::error::DomainError;
use storyloom_core::ids::SessionId;

use crate::domain::record::{LegacyMessage, SessionRecord, legacy_tree};
use crate::domain::session::{Session, SessionConfig};

/// Marker written into every export.
pub const EXPORT_FORMAT: &str = "storyloom-session";

/// Current export layout version.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Serialize)]
struct ExportDocument<'a> {
    format: &'static str,
    version: u32,
    checksum: String,
    session: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ImportDocument {
    #[serde(default)]
    format: Option<String>,
    #[serde(default)]
    version: Option<u32>,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    session: Option<serde_json::Value>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    config: Option<SessionConfig>,
    #[serde(default)]
    messages: Option<Vec<LegacyMessage>>,
}

fn checksum(body: &serde_json::Value) -> Result<String, DomainError> {
    let bytes = serde_json::to_vec(body)
        .map_err(|e| DomainError::Infrastructure(format!("checksum serialization failed: {e}")))?;
    Ok(format!("{:x}", Sha256::digest(bytes)))
}

/// Serialises a session as a YAML export document.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if serialization fails.
pub fn export_session(session: &Session) -> Result<String, DomainError> {
    let body = serde_json::to_value(SessionRecord::from(session))
        .map_err(|e| DomainError::Infrastructure(format!("export serialization failed: {e}")))?;
    let document = ExportDocument {
        format: EXPORT_FORMAT,
        version: EXPORT_VERSION,
        checksum: checksum(&body)?,
        session: &body,
    };
    serde_yaml::to_string(&document)
        .map_err(|e| DomainError::Infrastructure(format!("export serialization failed: {e}")))
}

/// Parses an export document into a new session with a fresh id.
///
/// # Errors
///
/// Returns `DomainError::Import` if the document is not valid YAML, has an
/// unknown format or a newer version, fails its checksum, or contains
/// neither a session nor a message list.
pub fn import_session(document: &str, clock: &dyn Clock) -> Result<Session, DomainError> {
    let document: ImportDocument = serde_yaml::from_str(document)
        .map_err(|e| DomainError::Import(format!("invalid YAML document: {e}")))?;

    if let Some(format) = document.format.as_deref().filter(|f| *f != EXPORT_FORMAT) {
        return Err(DomainError::Import(format!("unknown document format: {format}")));
    }
    if let Some(version) = document.version.filter(|v| *v > EXPORT_VERSION) {
        return Err(DomainError::Import(format!(
            "document version {version} is newer than supported version {EXPORT_VERSION}"
        )));
    }

    let mut session = match (document.session, document.messages) {
        (Some(body), _) => {
            if let Some(expected) = document.checksum.as_deref() {
                let actual = checksum(&body)?;
                if !actual.eq_ignore_ascii_case(expected) {
                    return Err(DomainError::Import(
                        "checksum mismatch: the document was modified or truncated".to_owned(),
                    ));
                }
            }
            let record: SessionRecord = serde_json::from_value(body)
                .map_err(|e| DomainError::Import(format!("invalid session body: {e}")))?;
            record.into_session(clock)
        }
        (None, Some(messages)) => {
            let mut session = Session::new(
                document.title.unwrap_or_else(|| "Imported story".to_owned()),
                document.config.unwrap_or_default(),
                clock,
            );
            session.tree = legacy_tree(messages, clock.now());
            session
        }
        (None, None) => {
            return Err(DomainError::Import(
                "document contains neither a session nor a message list".to_owned(),
            ));
        }
    };

    session.id = SessionId::new();
    session.touch(clock);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use storyloom_narrative::{Placement, Role, TurnContent};
    use storyloom_test_support::FixedClock;
    use storyloom_world_state::{TimelineEvent, WorldSnapshot};

    use super::*;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap())
    }

    fn sample_session() -> Session {
        let clock = clock();
        let mut session = Session::new(
            "Saltmarsh",
            SessionConfig {
                tone: "eerie".to_owned(),
                ..SessionConfig::default()
            },
            &clock,
        );
        session.tree.append_user(Placement::Leaf, "Row out", &clock);
        session
            .tree
            .append_agent(Placement::Leaf, TurnContent::text("Fog thickens"), &clock);
        session.world.push(WorldSnapshot {
            timeline: vec![TimelineEvent {
                year: "12".to_owned(),
                title: "The flood".to_owned(),
                description: String::new(),
            }],
            ..WorldSnapshot::default()
        });
        session
    }

    #[test]
    fn test_export_then_import_yields_equal_content_under_new_id() {
        // Arrange
        let session = sample_session();

        // Act
        let yaml = export_session(&session).unwrap();
        let imported = import_session(&yaml, &clock()).unwrap();

        // Assert
        assert!(yaml.contains("format: storyloom-session"));
        assert_ne!(imported.id, session.id);
        assert_eq!(imported.title, session.title);
        assert_eq!(imported.config, session.config);
        assert_eq!(imported.tree, session.tree);
        assert_eq!(imported.world.current(), session.world.current());
    }

    #[test]
    fn test_tampered_export_fails_checksum() {
        let yaml = export_session(&sample_session())
            .unwrap()
            .replace("Fog thickens", "Sun shines");

        let result = import_session(&yaml, &clock());

        assert!(matches!(result, Err(DomainError::Import(message)) if message.contains("checksum")));
    }

    #[test]
    fn test_flat_message_document_imports_as_chain() {
        // Arrange
        let yaml = "title: Notes\nmessages:\n  - role: user\n    text: Knock\n  - role: assistant\n    text: Who is there?\n";

        // Act
        let session = import_session(yaml, &clock()).unwrap();

        // Assert
        assert_eq!(session.title, "Notes");
        let transcript = session.tree.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].role(), Role::Agent);
        assert_eq!(transcript[1].parent_id(), Some(transcript[0].id()));
    }

    #[test]
    fn test_structurally_invalid_documents_are_rejected() {
        let clock = clock();

        assert!(matches!(import_session("- just\n- a list\n", &clock), Err(DomainError::Import(_))));
        assert!(matches!(import_session("title: Nothing here\n", &clock), Err(DomainError::Import(_))));
        assert!(matches!(
            import_session("format: other-app\nmessages: []\n", &clock),
            Err(DomainError::Import(_))
        ));
        assert!(matches!(
            import_session("version: 99\nmessages: []\n", &clock),
            Err(DomainError::Import(_))
        ));
    }

    #[test]
    fn test_broken_tree_links_are_rejected() {
        let yaml = format!(
            "session:\n  title: Broken\n  tree:\n    nodes:\n      {id}:\n        id: {id}\n        parent_id: {missing}\n        role: user\n        created_at: 2026-01-15T10:00:00Z\n        text: orphan\n    leaf_id: {id}\n",
            id = SessionId::new(),
            missing = SessionId::new(),
        );

        let result = import_session(&yaml, &clock());

        assert!(matches!(result, Err(DomainError::Import(_))));
    }
}
