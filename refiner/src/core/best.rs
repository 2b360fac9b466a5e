//! Best-iteration tracking and rollback.

use serde::Serialize;

use crate::core::focus::FocusFactors;
use crate::core::state::{RoundSnapshot, RunState};
use crate::core::types::Scores;

/// Highest-scoring round seen so far in the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestIteration {
    pub iteration: u32,
    pub draft: String,
    pub scores: Scores,
    pub total_score: u32,
    pub review_feedback: String,
    /// Focus factors as they stood right after this round was scored.
    pub focus: FocusFactors,
}

/// Fields restored by a rollback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollbackPatch {
    pub draft: String,
    pub total_score: u32,
    pub scores: Scores,
    pub focus: FocusFactors,
    pub iteration_count: u32,
}

/// Replace `best` with `round` only on strict improvement; ties keep the earlier round.
pub fn track_best(best: &mut Option<BestIteration>, round: &RoundSnapshot, focus: &FocusFactors) {
    let improved = best
        .as_ref()
        .is_none_or(|current| round.total_score > current.total_score);
    if !improved {
        return;
    }
    *best = Some(BestIteration {
        iteration: round.iteration,
        draft: round.draft.clone(),
        scores: round.scores.clone(),
        total_score: round.total_score,
        review_feedback: round.review_feedback.clone(),
        focus: focus.clone(),
    });
}

/// Build the patch that restores the working state to the best snapshot.
///
/// Returns `None` when no round has been recorded yet. History and the best
/// snapshot itself are never part of the patch.
pub fn rollback(state: &RunState) -> Option<RollbackPatch> {
    let best = state.best_iteration()?;
    Some(RollbackPatch {
        draft: best.draft.clone(),
        total_score: best.total_score,
        scores: best.scores.clone(),
        focus: best.focus.clone(),
        iteration_count: best.iteration,
    })
}
