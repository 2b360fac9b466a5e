//! Control-loop decision after each evaluation round.

use crate::core::regression::{
    active_focus_flattened, active_focus_regressed, first_iteration_focus_regressed,
    non_focus_regressed,
};
use crate::core::state::RunState;
use crate::core::types::StopReason;

/// Control-loop states. `Finish` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Generate,
    Evaluate,
    Revise,
    Rollback,
    Finish,
}

/// Next action chosen after an evaluation round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Revise,
    Rollback,
    Finish,
}

impl Action {
    pub fn next_phase(self) -> Phase {
        match self {
            Action::Revise => Phase::Revise,
            Action::Rollback => Phase::Rollback,
            Action::Finish => Phase::Finish,
        }
    }
}

/// Verdict returned by [`decide`]. `stop_reason` is the cause this rule
/// contributes; the driver records it unless an earlier cause already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub stop_reason: Option<StopReason>,
}

impl Decision {
    fn revise() -> Self {
        Self {
            action: Action::Revise,
            stop_reason: None,
        }
    }

    fn finish(reason: Option<StopReason>) -> Self {
        Self {
            action: Action::Finish,
            stop_reason: reason,
        }
    }

    fn rollback(reason: StopReason) -> Self {
        Self {
            action: Action::Rollback,
            stop_reason: Some(reason),
        }
    }
}

/// Evaluate the stop/rollback ladder in fixed priority order.
///
/// The first matching rule wins; later rules are not consulted.
pub fn decide(state: &RunState) -> Decision {
    let iteration = state.iteration_count();
    let history = state.history();
    let focus = state.focus();

    if state.fail_soft() {
        return Decision::finish(None);
    }

    if iteration == 0 && state.total_score() >= state.settings().strong_draft_threshold {
        return Decision::finish(Some(StopReason::StrongInitialDraft));
    }

    if iteration == 1 && first_iteration_focus_regressed(history, focus) {
        return Decision::finish(Some(StopReason::FirstIterationFocusRegressed));
    }

    if iteration >= 2 && active_focus_regressed(history, focus) {
        return Decision::rollback(StopReason::ActiveFocusRegressed);
    }

    if iteration >= 2
        && active_focus_flattened(history, focus)
        && non_focus_regressed(history, focus)
    {
        return Decision::rollback(StopReason::NonFocusRegressed);
    }

    if focus.active().is_empty() {
        return Decision::finish(Some(StopReason::FocusGraduated));
    }

    if iteration >= state.max_iterations() {
        return Decision::finish(Some(StopReason::MaxIterationsReached));
    }

    if state.stop_reason() == Some(StopReason::TokenBudgetExceeded) {
        return Decision::finish(None);
    }

    Decision::revise()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{RevisionPatch, StagePatch};
    use crate::core::types::{Scores, Stage};
    use crate::test_support::{evaluation, new_state, scores};

    /// Drive a state through the given rounds, revising between them.
    fn state_with_rounds(max_iterations: u32, rounds: &[(Scores, u32)]) -> RunState {
        let mut state = new_state(max_iterations, 100_000);
        for (i, (round_scores, total)) in rounds.iter().enumerate() {
            if i > 0 {
                state
                    .apply(StagePatch::Revision(RevisionPatch {
                        draft: format!("v{i}"),
                    }))
                    .expect("revision");
            }
            state
                .apply(StagePatch::Evaluation(evaluation(round_scores.clone(), *total)))
                .expect("evaluation");
        }
        state
    }

    #[test]
    fn strong_initial_draft_finishes_at_iteration_zero() {
        let state = state_with_rounds(3, &[(scores(9, 9, 9, 9, 9), 45)]);
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(decision.stop_reason, Some(StopReason::StrongInitialDraft));
    }

    #[test]
    fn weak_initial_draft_continues() {
        let state = state_with_rounds(3, &[(scores(5, 6, 4, 7, 8), 30)]);
        assert_eq!(decide(&state).action, Action::Revise);
    }

    #[test]
    fn first_iteration_regression_finishes_without_rollback() {
        let state = state_with_rounds(
            3,
            &[(scores(8, 9, 4, 9, 9), 38), (scores(8, 9, 3, 9, 9), 37)],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(
            decision.stop_reason,
            Some(StopReason::FirstIterationFocusRegressed)
        );
    }

    #[test]
    fn later_active_regression_rolls_back() {
        let state = state_with_rounds(
            5,
            &[
                (scores(5, 9, 4, 9, 9), 25),
                (scores(6, 9, 5, 9, 9), 30),
                (scores(6, 9, 4, 9, 9), 28),
            ],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Rollback);
        assert_eq!(decision.stop_reason, Some(StopReason::ActiveFocusRegressed));
    }

    #[test]
    fn flattened_focus_with_collateral_drop_rolls_back() {
        let state = state_with_rounds(
            5,
            &[
                (scores(5, 9, 4, 9, 9), 25),
                (scores(6, 9, 5, 9, 9), 30),
                (scores(6, 9, 5, 9, 7), 29),
            ],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Rollback);
        assert_eq!(decision.stop_reason, Some(StopReason::NonFocusRegressed));
    }

    #[test]
    fn flattened_focus_without_collateral_drop_continues() {
        let state = state_with_rounds(
            5,
            &[
                (scores(5, 9, 4, 9, 9), 25),
                (scores(6, 9, 5, 9, 9), 30),
                (scores(6, 9, 5, 9, 9), 30),
            ],
        );
        assert_eq!(decide(&state).action, Action::Revise);
    }

    #[test]
    fn all_focus_graduated_finishes() {
        let state = state_with_rounds(
            5,
            &[(scores(5, 9, 4, 9, 9), 25), (scores(8, 9, 8, 9, 9), 35)],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(decision.stop_reason, Some(StopReason::FocusGraduated));
    }

    #[test]
    fn max_iterations_finishes() {
        let state = state_with_rounds(
            1,
            &[(scores(5, 9, 4, 9, 9), 25), (scores(6, 9, 5, 9, 9), 30)],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(decision.stop_reason, Some(StopReason::MaxIterationsReached));
    }

    #[test]
    fn recorded_budget_exhaustion_finishes() {
        let mut state = state_with_rounds(5, &[(scores(5, 9, 4, 9, 9), 25)]);
        state.record_stop(StopReason::TokenBudgetExceeded);
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(decision.stop_reason, None);
    }

    #[test]
    fn fail_soft_wins_over_every_other_rule() {
        let mut state = state_with_rounds(1, &[(scores(9, 9, 9, 9, 9), 45)]);
        state.mark_fail_soft(Stage::Evaluator, "remote error".to_string());
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Finish);
        assert_eq!(decision.stop_reason, None);
    }

    #[test]
    fn active_regression_outranks_flattening_and_graduation_rules() {
        // Round 2 is both an active-focus regression (density dropped) and a
        // flattened focus with a collateral drop (voice). The active-focus
        // regression must win.
        let state = state_with_rounds(
            2,
            &[
                (scores(5, 9, 4, 9, 9), 25),
                (scores(6, 9, 5, 9, 9), 30),
                (scores(6, 9, 4, 9, 7), 26),
            ],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Rollback);
        assert_eq!(decision.stop_reason, Some(StopReason::ActiveFocusRegressed));
    }

    #[test]
    fn collateral_rollback_outranks_focus_graduated() {
        // Both focus factors graduated in round 1; round 2 drops a non-focus
        // dimension. Flattening is vacuous, so the collateral-drop rollback
        // fires before the focus-graduated finish.
        let state = state_with_rounds(
            5,
            &[
                (scores(5, 9, 4, 9, 9), 25),
                (scores(8, 9, 8, 9, 9), 35),
                (scores(8, 9, 8, 6, 9), 32),
            ],
        );
        let decision = decide(&state);
        assert_eq!(decision.action, Action::Rollback);
        assert_eq!(decision.stop_reason, Some(StopReason::NonFocusRegressed));
    }
}
