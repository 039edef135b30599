//! Session store database schema.

/// Row key of the single library row.
pub const LIBRARY_ROW_ID: i16 = 1;

/// SQL to create the session library table. Shared with the migrations
/// directory so `sqlx::test` and `ensure_schema` agree.
pub const CREATE_SESSION_LIBRARY_TABLE: &str =
    include_str!("../../../migrations/0001_session_library.sql");
