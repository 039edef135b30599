//! Session aggregate, commands and the persisted record format.

pub mod commands;
pub mod record;
pub mod session;
