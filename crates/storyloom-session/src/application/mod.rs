//! Command dispatch, request building, persistence and queries.

pub mod command_handlers;
pub mod context;
pub mod persistence;
pub mod query_handlers;
pub mod transfer;
