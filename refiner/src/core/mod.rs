//! Deterministic, pure logic for the refinement control loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! run state and return deterministic outputs suitable for tests.

pub mod best;
pub mod budget;
pub mod decision;
pub mod focus;
pub mod guard;
pub mod regression;
pub mod state;
pub mod types;
