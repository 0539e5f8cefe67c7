//! Test helpers.
//!
//! Seeded generators for synthetic event streams, shared by unit tests,
//! integration tests and benches.

pub mod data;
