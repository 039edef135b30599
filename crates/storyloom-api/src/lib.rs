//! Storyloom: HTTP API library.
//!
//! Exposes the router, state and infrastructure adapters so that the binary
//! and the integration tests build the same application.

pub mod config;
pub mod error;
pub mod generator;
pub mod routes;
pub mod state;
pub mod telemetry;
