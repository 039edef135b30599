//! Storyloom Core: shared domain abstractions.
//!
//! This crate defines the identifiers, error types, and collaborator
//! contracts (generator, session store) that every other crate depends on.
//! It contains no infrastructure code.

pub mod clock;
pub mod error;
pub mod generator;
pub mod ids;
pub mod store;
