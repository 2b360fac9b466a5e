//! Fail-soft wrapper around collaborator calls.

use crate::core::state::RunState;
use crate::core::types::{CollaboratorError, Stage};

/// Tagged outcome of a guarded collaborator call.
#[derive(Debug, PartialEq, Eq)]
pub enum Guarded<P> {
    /// The call succeeded with a patch to merge.
    Ok(P),
    /// A transient failure ended the run. Carries the original error text.
    FailSoft(String),
    /// The collaborator broke its contract. Must be propagated, never swallowed.
    Fatal(CollaboratorError),
}

/// Run `op` against `state`, converting transient failures into fail-soft.
///
/// On a transient failure the state is marked fail-soft with
/// `<stage>_fail_soft` as the stop reason. Contract violations leave the state
/// untouched and come back as [`Guarded::Fatal`].
pub fn guard<P, F>(state: &mut RunState, stage: Stage, op: F) -> Guarded<P>
where
    F: FnOnce(&RunState) -> Result<P, CollaboratorError>,
{
    state.record_call(stage);
    match op(state) {
        Ok(patch) => Guarded::Ok(patch),
        Err(err) if err.is_transient() => {
            let message = err.to_string();
            state.mark_fail_soft(stage, message.clone());
            Guarded::FailSoft(message)
        }
        Err(err) => Guarded::Fatal(err),
    }
}
