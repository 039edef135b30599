//! Domain model for the task queue.

pub mod item;
pub mod state;
