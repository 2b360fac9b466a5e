//! Run-boundary request and response types.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::best::BestIteration;
use crate::core::focus::FocusFactors;
use crate::core::state::{RoundSnapshot, RunMetrics, RunState};
use crate::core::types::{ReviewDecision, StopReason, Style};

/// Upper bound on `max_iterations` accepted from callers.
pub const MAX_ITERATIONS_LIMIT: u32 = 8;
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// A single refinement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// User-provided content or claim to write about.
    pub topic: String,
    #[serde(default)]
    pub style: Style,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

impl RunRequest {
    pub fn new(topic: impl Into<String>, style: Style, max_iterations: u32) -> Self {
        Self {
            topic: topic.into(),
            style,
            max_iterations,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.topic.trim().is_empty() {
            bail!("topic must not be empty");
        }
        if !(1..=MAX_ITERATIONS_LIMIT).contains(&self.max_iterations) {
            bail!(
                "max_iterations must be in 1..={MAX_ITERATIONS_LIMIT} (got {})",
                self.max_iterations
            );
        }
        Ok(())
    }
}

/// Final result of a run. Always carries a draft and the reason the loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResponse {
    pub final_draft: String,
    pub iterations_used: u32,
    pub final_score: u32,
    pub best_score: Option<u32>,
    pub review_decision: ReviewDecision,
    pub stop_reason: Option<StopReason>,
    pub fail_soft: bool,
    pub change_summary: Option<String>,
    pub budget_remaining: u64,
    pub budget_spent: u64,
    pub metrics: RunMetrics,
}

impl RunResponse {
    /// Build the response from a finished run.
    ///
    /// An unscored working draft (e.g. a revision whose evaluation failed) is
    /// replaced by the best recorded draft.
    pub fn from_state(state: &RunState) -> Self {
        let best = state.best_iteration();
        let (final_draft, iterations_used, final_score, review_decision) =
            match (state.draft_is_scored(), best) {
                (false, Some(best)) => (
                    best.draft.clone(),
                    best.iteration,
                    best.total_score,
                    ReviewDecision::from_total(best.total_score, state.settings().accept_threshold),
                ),
                _ => (
                    state.draft().to_string(),
                    state.iteration_count(),
                    state.total_score(),
                    state.review_decision(),
                ),
            };
        Self {
            final_draft,
            iterations_used,
            final_score,
            best_score: best.map(|b| b.total_score),
            review_decision,
            stop_reason: state.stop_reason(),
            fail_soft: state.fail_soft(),
            change_summary: state.change_summary().map(str::to_string),
            budget_remaining: state.budget().remaining(),
            budget_spent: state.budget().spent(),
            metrics: state.metrics().clone(),
        }
    }
}

/// Full audit record of a run, written by `refiner run --report`.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub request: RunRequest,
    pub response: RunResponse,
    pub focus: FocusFactors,
    pub history: Vec<RoundSnapshot>,
    pub best_iteration: Option<BestIteration>,
}

impl RunReport {
    pub fn new(request: &RunRequest, state: &RunState) -> Self {
        Self {
            request: request.clone(),
            response: RunResponse::from_state(state),
            focus: state.focus().clone(),
            history: state.history().to_vec(),
            best_iteration: state.best_iteration().cloned(),
        }
    }
}
