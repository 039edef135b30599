//! Storyloom Store: `SessionStore` implementations.
//!
//! Both stores treat the library as one opaque JSON document.

pub mod file_session_store;
pub mod pg_session_store;
pub mod schema;
