//! Shared application state.

use std::sync::Arc;

use storyloom_queue::TaskQueue;
use storyloom_session::SessionEngine;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry and command dispatcher.
    pub engine: Arc<SessionEngine>,
    /// Background generation queue.
    pub queue: TaskQueue,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(engine: Arc<SessionEngine>, queue: TaskQueue) -> Self {
        Self { engine, queue }
    }
}
