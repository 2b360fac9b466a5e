//! Stable exit codes for refiner CLI commands.

/// Command succeeded; a run finished normally.
pub const OK: i32 = 0;
/// Invalid request/config, contract violation, or other errors.
pub const INVALID: i32 = 1;
/// `refiner run` ended fail-soft after a collaborator failure. The best draft is still printed.
pub const FAIL_SOFT: i32 = 2;
