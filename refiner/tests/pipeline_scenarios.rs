//! End-to-end control-loop scenarios driven by scripted collaborators.
//!
//! Each test queues evaluator answers, runs `run_pipeline`, and checks the
//! stop reason, the returned draft, and which stages were invoked.

use refiner::core::types::{CollaboratorError, Dimension, ReviewDecision, Stage, StopReason, Style};
use refiner::io::config::RefinerConfig;
use refiner::pipeline::run_pipeline;
use refiner::request::{RunRequest, RunResponse};
use refiner::test_support::{ScriptedCollaborators, evaluation, scores};

fn request(max_iterations: u32) -> RunRequest {
    RunRequest::new(
        "we cut deploy time from 40m to 6m by caching layers",
        Style::EngineeringDirect,
        max_iterations,
    )
}

fn optimizer_calls(collaborators: &ScriptedCollaborators) -> usize {
    collaborators
        .calls()
        .iter()
        .filter(|stage| **stage == Stage::Optimizer)
        .count()
}

/// Round 0 at or above the strong-draft threshold ends the run unrevised.
#[test]
fn strong_initial_draft_finishes_without_revision() {
    let collaborators = ScriptedCollaborators::new(vec![evaluation(scores(9, 9, 9, 9, 9), 45)]);
    let state = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::StrongInitialDraft));
    assert_eq!(state.iteration_count(), 0);
    assert_eq!(optimizer_calls(&collaborators), 0);

    let response = RunResponse::from_state(&state);
    assert_eq!(response.final_draft, "v0");
    assert_eq!(response.final_score, 45);
    assert_eq!(response.review_decision, ReviewDecision::Accept);
}

/// A frozen focus dimension dropping in round 1 finishes without rollback.
#[test]
fn first_iteration_focus_regression_finishes() {
    let collaborators = ScriptedCollaborators::new(vec![
        evaluation(scores(8, 9, 4, 9, 9), 39),
        evaluation(scores(8, 9, 3, 9, 9), 38),
    ]);
    let state = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(
        state.focus().frozen(),
        Some([Dimension::Density, Dimension::Hook])
    );
    assert_eq!(
        state.stop_reason(),
        Some(StopReason::FirstIterationFocusRegressed)
    );
    assert_eq!(state.iteration_count(), 1);
    assert_eq!(state.metrics().rollbacks, 0);
    assert_eq!(optimizer_calls(&collaborators), 1);
}

/// An active focus dimension declining after round 2 rolls back to the best round.
#[test]
fn active_focus_regression_rolls_back_to_best() {
    let collaborators = ScriptedCollaborators::new(vec![
        evaluation(scores(5, 5, 4, 5, 6), 25),
        evaluation(scores(6, 6, 5, 6, 7), 30),
        evaluation(scores(7, 7, 6, 7, 8), 35),
        evaluation(scores(7, 6, 3, 6, 6), 28),
    ]);
    let state = run_pipeline(&request(5), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::ActiveFocusRegressed));
    assert_eq!(state.metrics().rollbacks, 1);
    assert_eq!(state.history().len(), 4);

    let best = state.best_iteration().expect("best");
    assert_eq!(best.iteration, 2);
    assert_eq!(best.total_score, 35);
    assert_eq!(state.draft(), "v2");
    assert_eq!(state.iteration_count(), 2);
    assert_eq!(state.total_score(), 35);

    let response = RunResponse::from_state(&state);
    assert_eq!(response.final_draft, "v2");
    assert_eq!(response.final_score, 35);
}

/// Running out of budget before the second revision keeps round 1's draft.
#[test]
fn budget_exhaustion_returns_last_scored_draft() {
    // generate 1200 + evaluate 800 + revise 1000 + evaluate 800 leaves 200.
    let config = RefinerConfig {
        budget_units: 4_000,
        ..RefinerConfig::default()
    };
    let collaborators = ScriptedCollaborators::new(vec![
        evaluation(scores(5, 9, 4, 9, 9), 36),
        evaluation(scores(6, 9, 5, 9, 9), 38),
    ]);
    let state = run_pipeline(&request(3), &config, &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::TokenBudgetExceeded));
    assert!(!state.fail_soft());
    assert_eq!(state.budget().remaining(), 200);
    assert_eq!(optimizer_calls(&collaborators), 1);
    // The summarizer cannot be afforded either.
    assert!(collaborators.summarizer_inputs().is_empty());
    assert_eq!(state.change_summary(), None);

    let response = RunResponse::from_state(&state);
    assert_eq!(response.final_draft, "v1");
    assert_eq!(response.iterations_used, 1);
    assert_eq!(response.budget_remaining, 200);
}

/// A revision that was paid for but cannot be evaluated falls back to the best draft.
#[test]
fn unaffordable_evaluation_returns_best_draft() {
    // generate 1200 + evaluate 800 + revise 1000 leaves 500: enough for the
    // summarizer, not for another evaluation.
    let config = RefinerConfig {
        budget_units: 3_500,
        ..RefinerConfig::default()
    };
    let collaborators = ScriptedCollaborators::new(vec![evaluation(scores(5, 9, 4, 9, 9), 36)]);
    let state = run_pipeline(&request(3), &config, &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::TokenBudgetExceeded));
    assert!(!state.fail_soft());
    assert_eq!(optimizer_calls(&collaborators), 1);
    assert_eq!(state.draft(), "v1");
    assert_eq!(state.history().len(), 1);
    assert_eq!(collaborators.summarizer_inputs().len(), 1);
    assert_eq!(state.budget().remaining(), 100);

    let response = RunResponse::from_state(&state);
    assert_eq!(response.final_draft, "v0");
    assert_eq!(response.final_score, 36);
    assert_eq!(response.iterations_used, 0);
}

/// Flat focus with a collateral drop rolls back on the non-focus rule.
#[test]
fn collateral_regression_with_flat_focus_rolls_back() {
    let collaborators = ScriptedCollaborators::new(vec![
        evaluation(scores(5, 9, 4, 9, 9), 36),
        evaluation(scores(6, 9, 5, 9, 9), 38),
        evaluation(scores(6, 8, 5, 9, 9), 37),
    ])
    .with_revisions(vec!["denser take", "padded take"]);
    let state = run_pipeline(&request(5), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::NonFocusRegressed));
    assert_eq!(state.metrics().rollbacks, 1);
    assert_eq!(state.draft(), "denser take");
    assert_eq!(state.total_score(), 38);
}

#[test]
fn graduating_every_focus_factor_finishes() {
    let collaborators = ScriptedCollaborators::new(vec![
        evaluation(scores(5, 9, 4, 9, 9), 36),
        evaluation(scores(8, 9, 8, 9, 9), 43),
    ]);
    let state = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::FocusGraduated));
    assert!(state.focus().active().is_empty());
    assert_eq!(
        state.metrics().graduations,
        vec![(1, Dimension::Density), (1, Dimension::Hook)]
    );
    assert_eq!(state.review_decision(), ReviewDecision::Accept);
}

#[test]
fn max_iterations_stop_and_summarizer_inputs() {
    let collaborators = ScriptedCollaborators::new(vec![
        evaluation(scores(5, 9, 4, 9, 9), 36),
        evaluation(scores(6, 9, 5, 9, 9), 38),
        evaluation(scores(7, 9, 6, 9, 9), 40),
    ]);
    let state = run_pipeline(&request(2), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::MaxIterationsReached));
    assert_eq!(state.iteration_count(), 2);

    let inputs = collaborators.summarizer_inputs();
    assert_eq!(inputs.len(), 1);
    assert_eq!(inputs[0].initial.iteration, 0);
    assert_eq!(inputs[0].initial.total_score, 36);
    assert_eq!(inputs[0].best.iteration, 2);
    assert_eq!(inputs[0].best.total_score, 40);
    assert_eq!(
        state.change_summary(),
        Some("tightened the opening and cut filler")
    );
}

/// A failed evaluation of a revision returns the best scored draft instead.
#[test]
fn evaluator_timeout_returns_best_draft() {
    let collaborators = ScriptedCollaborators::new(vec![evaluation(scores(5, 9, 4, 9, 9), 36)])
        .fail_stage_on_call(
            Stage::Evaluator,
            2,
            CollaboratorError::Timeout("evaluator exceeded 120s".to_string()),
        );
    let state = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators).expect("run");

    assert!(state.fail_soft());
    assert_eq!(state.stop_reason(), Some(StopReason::FailSoft(Stage::Evaluator)));
    assert_eq!(state.draft(), "v1");
    assert_eq!(
        state.metrics().fail_soft_error.as_deref(),
        Some("collaborator timed out: evaluator exceeded 120s")
    );
    assert_eq!(collaborators.summarizer_inputs().len(), 1);

    let response = RunResponse::from_state(&state);
    assert!(response.fail_soft);
    assert_eq!(
        response.stop_reason.map(|r| r.to_string()).as_deref(),
        Some("evaluator_fail_soft")
    );
    assert_eq!(response.final_draft, "v0");
    assert_eq!(response.final_score, 36);
}

#[test]
fn optimizer_failure_keeps_scored_draft() {
    let collaborators = ScriptedCollaborators::new(vec![evaluation(scores(5, 9, 4, 9, 9), 36)])
        .fail_stage(
            Stage::Optimizer,
            CollaboratorError::Remote("503 from upstream".to_string()),
        );
    let state = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::FailSoft(Stage::Optimizer)));
    assert_eq!(state.draft(), "v0");
    assert_eq!(state.iteration_count(), 0);
}

/// A summarizer failure does not replace the stop reason of the loop.
#[test]
fn summarizer_failure_keeps_loop_stop_reason() {
    let collaborators = ScriptedCollaborators::new(vec![evaluation(scores(9, 9, 9, 9, 9), 45)])
        .fail_stage(
            Stage::Summarizer,
            CollaboratorError::Timeout("slow".to_string()),
        );
    let state = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators).expect("run");

    assert_eq!(state.stop_reason(), Some(StopReason::StrongInitialDraft));
    assert!(state.fail_soft());
    assert_eq!(state.change_summary(), None);
}

#[test]
fn malformed_evaluation_is_fatal() {
    let collaborators = ScriptedCollaborators::new(vec![evaluation(scores(9, 9, 9, 9, 9), 51)]);
    let err = run_pipeline(&request(3), &RefinerConfig::default(), &collaborators)
        .expect_err("total out of range");
    assert!(err.to_string().contains("evaluator violated its output contract"));
}
