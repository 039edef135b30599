//! Async processing of queued tasks.

pub mod processor;
