//! Bounded draft-refinement control loop.
//!
//! A request is turned into a draft by external collaborators, scored on a
//! closed set of quality dimensions, and revised until a stop condition holds.
//! The crate keeps the loop itself deterministic:
//!
//! - **[`core`]**: Pure control logic (focus factors, regression checks,
//!   best-iteration tracking, budget, stop ladder). No I/O.
//! - **[`io`]**: Side-effecting operations (config files, collaborator
//!   processes, prompt rendering, run reports). Isolated behind the
//!   [`io::collaborator::Collaborators`] trait so tests can script it.
//!
//! [`pipeline`] drives one [`request::RunRequest`] through both layers.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod request;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
