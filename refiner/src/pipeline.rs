//! Pipeline driver: runs one refinement request end to end.
//!
//! The driver owns the [`RunState`] and walks the control-loop phases:
//! classify intent, retrieve references, generate, then alternate evaluate and
//! revise until [`decide`] finishes or rolls back. The change summary is
//! produced once, after the loop.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::best::rollback;
use crate::core::decision::{Action, Phase, decide};
use crate::core::guard::{Guarded, guard};
use crate::core::state::{RunState, StagePatch};
use crate::core::types::{CollaboratorError, StopReason, Stage};
use crate::io::collaborator::Collaborators;
use crate::io::config::RefinerConfig;
use crate::request::RunRequest;

/// Run a request to completion and return the final state.
///
/// Transient collaborator failures end the run fail-soft and still return
/// `Ok`. Contract violations and invalid input are errors.
#[instrument(skip_all, fields(style = ?request.style, max_iterations = request.max_iterations))]
pub fn run_pipeline<C: Collaborators>(
    request: &RunRequest,
    config: &RefinerConfig,
    collaborators: &C,
) -> Result<RunState> {
    request.validate().context("invalid request")?;
    config.validate().context("invalid config")?;

    let mut state = RunState::new(request, config.loop_settings(), config.budget_ledger());
    info!(budget = state.budget().remaining(), "run started");

    let mut phase = prepare(&mut state, collaborators)?;
    while phase != Phase::Finish {
        phase = match phase {
            Phase::Generate => generate(&mut state, collaborators)?,
            Phase::Evaluate => evaluate(&mut state, collaborators)?,
            Phase::Revise => revise(&mut state, collaborators)?,
            Phase::Rollback => apply_rollback(&mut state)?,
            Phase::Finish => Phase::Finish,
        };
    }

    summarize(&mut state, collaborators)?;

    info!(
        iterations = state.iteration_count(),
        total_score = state.total_score(),
        stop_reason = ?state.stop_reason().map(|r| r.to_string()),
        fail_soft = state.fail_soft(),
        spent = state.budget().spent(),
        "run finished"
    );
    Ok(state)
}

/// Intent classification and reference retrieval. Neither is charged.
fn prepare<C: Collaborators>(state: &mut RunState, collaborators: &C) -> Result<Phase> {
    let Some(patch) = call(state, Stage::IntentClassifier, |s| {
        collaborators.classify_intent(s)
    })?
    else {
        return Ok(Phase::Finish);
    };
    debug!(intent = ?patch.intent, "intent classified");
    merge(state, Stage::IntentClassifier, StagePatch::Intent(patch))?;

    let Some(patch) = call(state, Stage::ReferenceRetriever, |s| {
        collaborators.retrieve_references(s)
    })?
    else {
        return Ok(Phase::Finish);
    };
    debug!(references = patch.references.len(), "references retrieved");
    merge(state, Stage::ReferenceRetriever, StagePatch::References(patch))?;

    Ok(Phase::Generate)
}

fn generate<C: Collaborators>(state: &mut RunState, collaborators: &C) -> Result<Phase> {
    if !reserve(state, Stage::Generator)? {
        return Ok(Phase::Finish);
    }
    let Some(patch) = call(state, Stage::Generator, |s| collaborators.generate(s))? else {
        return Ok(Phase::Finish);
    };
    merge(state, Stage::Generator, StagePatch::Draft(patch))?;
    Ok(Phase::Evaluate)
}

fn evaluate<C: Collaborators>(state: &mut RunState, collaborators: &C) -> Result<Phase> {
    if !reserve(state, Stage::Evaluator)? {
        return Ok(Phase::Finish);
    }
    let Some(patch) = call(state, Stage::Evaluator, |s| collaborators.evaluate(s))? else {
        return Ok(Phase::Finish);
    };
    merge(state, Stage::Evaluator, StagePatch::Evaluation(patch))?;
    info!(
        iteration = state.iteration_count(),
        total_score = state.total_score(),
        decision = ?state.review_decision(),
        active_focus = ?state.focus().active(),
        "round scored"
    );
    Ok(next_phase(state))
}

fn revise<C: Collaborators>(state: &mut RunState, collaborators: &C) -> Result<Phase> {
    if !reserve(state, Stage::Optimizer)? {
        // The ladder sees the budget stop on its next pass.
        return Ok(next_phase(state));
    }
    let Some(patch) = call(state, Stage::Optimizer, |s| collaborators.revise(s))? else {
        return Ok(Phase::Finish);
    };
    merge(state, Stage::Optimizer, StagePatch::Revision(patch))?;
    Ok(Phase::Evaluate)
}

fn apply_rollback(state: &mut RunState) -> Result<Phase> {
    let patch =
        rollback(state).ok_or_else(|| anyhow!("rollback requested without a best iteration"))?;
    info!(
        to_iteration = patch.iteration_count,
        total_score = patch.total_score,
        "rolling back to best iteration"
    );
    state
        .apply(StagePatch::Rollback(patch))
        .map_err(|err| anyhow!("apply rollback: {err}"))?;
    Ok(Phase::Finish)
}

/// Produce the change summary from the first round and the best round.
///
/// Skipped when either is missing or the budget cannot cover it. A transient
/// failure leaves the summary empty.
fn summarize<C: Collaborators>(state: &mut RunState, collaborators: &C) -> Result<()> {
    let (Some(initial), Some(best)) = (state.history().first(), state.best_iteration()) else {
        debug!("no scored rounds, skipping change summary");
        return Ok(());
    };
    let (initial, best) = (initial.clone(), best.clone());

    if !reserve(state, Stage::Summarizer)? {
        return Ok(());
    }
    if let Some(patch) = call(state, Stage::Summarizer, |_| {
        collaborators.summarize(&initial, &best)
    })? {
        merge(state, Stage::Summarizer, StagePatch::Summary(patch))?;
    }
    Ok(())
}

/// Consult the ladder, record its stop reason, and map it to the next phase.
fn next_phase(state: &mut RunState) -> Phase {
    let decision = decide(state);
    if let Some(reason) = decision.stop_reason {
        if state.record_stop(reason) {
            info!(stop_reason = %reason, "stop condition reached");
        }
    }
    if decision.action == Action::Revise {
        debug!(iteration = state.iteration_count(), "continuing to revise");
    }
    decision.action.next_phase()
}

/// Check and charge the budget for `stage`. Returns `false` when it cannot be afforded.
fn reserve(state: &mut RunState, stage: Stage) -> Result<bool> {
    let Some(kind) = stage.cost_kind() else {
        return Ok(true);
    };
    if !state.budget().has_sufficient(kind) {
        warn!(
            stage = %stage,
            remaining = state.budget().remaining(),
            "budget exhausted"
        );
        if stage != Stage::Summarizer {
            state.record_stop(StopReason::TokenBudgetExceeded);
        }
        return Ok(false);
    }
    let remaining = state
        .charge(kind)
        .map_err(|err| anyhow!("charge {stage}: {err}"))?;
    debug!(stage = %stage, remaining, "budget charged");
    Ok(true)
}

/// Guarded collaborator call. `None` means the run went fail-soft.
fn call<P, F>(state: &mut RunState, stage: Stage, op: F) -> Result<Option<P>>
where
    F: FnOnce(&RunState) -> Result<P, CollaboratorError>,
{
    match guard(state, stage, op) {
        Guarded::Ok(patch) => Ok(Some(patch)),
        Guarded::FailSoft(error) => {
            warn!(stage = %stage, error = %error, "collaborator failed, finishing fail-soft");
            Ok(None)
        }
        Guarded::Fatal(err) => Err(anyhow!("{stage} violated its output contract: {err}")),
    }
}

fn merge(state: &mut RunState, stage: Stage, patch: StagePatch) -> Result<()> {
    state
        .apply(patch)
        .map_err(|err| anyhow!("{stage} violated its output contract: {err}"))
}
