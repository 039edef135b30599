//! Shared test mocks and utilities for Storyloom.

mod clock;
mod generator;
mod store;

pub use clock::FixedClock;
pub use generator::{ScriptStep, ScriptedGenerator};
pub use store::{FailingSessionStore, InMemorySessionStore};
