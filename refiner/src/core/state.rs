//! Run state threaded through every pipeline stage.
//!
//! `RunState` is created once per request, owned by the pipeline driver, and
//! mutated only through [`RunState::apply`] and the small set of bookkeeping
//! helpers below. Stage outputs arrive as typed patches; each patch variant
//! lists exactly the fields its stage may set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::best::{BestIteration, RollbackPatch, track_best};
use crate::core::budget::BudgetLedger;
use crate::core::focus::FocusFactors;
use crate::core::types::{
    CostKind, Dimension, Intent, MAX_TOTAL_SCORE, ReviewDecision, Scores, Stage, StopReason, Style,
};
use crate::request::RunRequest;

/// Thresholds that steer the control loop. Immutable for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSettings {
    /// Round-0 total at or above which the first draft is kept as-is.
    pub strong_draft_threshold: u32,
    /// Score at which a focus factor graduates.
    pub focus_graduation_threshold: u8,
    /// Total at or above which a draft is marked `accept`.
    pub accept_threshold: u32,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            strong_draft_threshold: 40,
            focus_graduation_threshold: 8,
            accept_threshold: 42,
        }
    }
}

/// Immutable record of one evaluation round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundSnapshot {
    /// `iteration_count` at the time the round was scored.
    pub iteration: u32,
    pub draft: String,
    pub scores: Scores,
    pub total_score: u32,
    pub review_feedback: String,
    pub review_decision: ReviewDecision,
}

/// Counters reported alongside the response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunMetrics {
    pub rollbacks: u32,
    /// Collaborator invocations per stage (including failed ones).
    pub calls: BTreeMap<Stage, u32>,
    /// `(round index, dimension)` for every graduation, in order.
    pub graduations: Vec<(usize, Dimension)>,
    /// Error text carried by a fail-soft termination.
    pub fail_soft_error: Option<String>,
}

/// Output of the intent classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentPatch {
    pub intent: Intent,
}

/// Output of the reference retriever.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferencesPatch {
    pub references: Vec<String>,
}

/// Output of the generator: the first draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPatch {
    pub draft: String,
}

/// Output of the evaluator for the current draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationPatch {
    pub scores: Scores,
    /// Model-reported total; the sum of `scores` when absent.
    #[serde(default)]
    pub total_score: Option<u32>,
    pub review_feedback: String,
}

/// Output of the optimizer: a revised draft. Applying it advances `iteration_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPatch {
    pub draft: String,
}

/// Output of the change summarizer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryPatch {
    pub summary: Option<String>,
}

/// Partial update produced by one pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagePatch {
    Intent(IntentPatch),
    References(ReferencesPatch),
    Draft(DraftPatch),
    Evaluation(EvaluationPatch),
    Revision(RevisionPatch),
    Rollback(RollbackPatch),
    Summary(SummaryPatch),
}

/// Mutable aggregate for a single refinement run.
#[derive(Debug, Clone)]
pub struct RunState {
    topic: String,
    style: Style,
    intent: Option<Intent>,
    references: Vec<String>,
    draft: String,
    iteration_count: u32,
    max_iterations: u32,
    scores: Option<Scores>,
    total_score: u32,
    review_feedback: String,
    review_decision: ReviewDecision,
    focus: FocusFactors,
    settings: LoopSettings,
    history: Vec<RoundSnapshot>,
    best_iteration: Option<BestIteration>,
    budget: BudgetLedger,
    stop_reason: Option<StopReason>,
    fail_soft: bool,
    change_summary: Option<String>,
    metrics: RunMetrics,
}

impl RunState {
    pub fn new(request: &RunRequest, settings: LoopSettings, budget: BudgetLedger) -> Self {
        Self {
            topic: request.topic.clone(),
            style: request.style,
            intent: None,
            references: Vec::new(),
            draft: String::new(),
            iteration_count: 0,
            max_iterations: request.max_iterations,
            scores: None,
            total_score: 0,
            review_feedback: String::new(),
            review_decision: ReviewDecision::Revise,
            focus: FocusFactors::default(),
            settings,
            history: Vec::new(),
            best_iteration: None,
            budget,
            stop_reason: None,
            fail_soft: false,
            change_summary: None,
            metrics: RunMetrics::default(),
        }
    }

    /// Merge a stage's output into the run state.
    ///
    /// Errors indicate a collaborator broke its contract (e.g. a total score
    /// out of range) and must not be treated as transient.
    pub fn apply(&mut self, patch: StagePatch) -> Result<(), String> {
        match patch {
            StagePatch::Intent(p) => self.intent = Some(p.intent),
            StagePatch::References(p) => self.references = p.references,
            StagePatch::Draft(p) => self.draft = p.draft,
            StagePatch::Evaluation(p) => self.apply_evaluation(p)?,
            StagePatch::Revision(p) => {
                self.draft = p.draft;
                self.iteration_count = self
                    .iteration_count
                    .checked_add(1)
                    .ok_or_else(|| "iteration_count overflow".to_string())?;
            }
            StagePatch::Rollback(p) => {
                self.draft = p.draft;
                self.total_score = p.total_score;
                self.scores = Some(p.scores);
                self.focus.restore(&p.focus);
                self.iteration_count = p.iteration_count;
                self.metrics.rollbacks += 1;
            }
            StagePatch::Summary(p) => self.change_summary = p.summary,
        }
        Ok(())
    }

    fn apply_evaluation(&mut self, patch: EvaluationPatch) -> Result<(), String> {
        let total_score = patch.total_score.unwrap_or_else(|| patch.scores.sum());
        if total_score > MAX_TOTAL_SCORE {
            return Err(format!(
                "total_score {total_score} out of range 0..={MAX_TOTAL_SCORE}"
            ));
        }
        let review_decision =
            ReviewDecision::from_total(total_score, self.settings.accept_threshold);

        let round = self.history.len();
        let graduated = self
            .focus
            .observe_round(&patch.scores, self.settings.focus_graduation_threshold);
        self.metrics
            .graduations
            .extend(graduated.into_iter().map(|dim| (round, dim)));

        let snapshot = RoundSnapshot {
            iteration: self.iteration_count,
            draft: self.draft.clone(),
            scores: patch.scores.clone(),
            total_score,
            review_feedback: patch.review_feedback.clone(),
            review_decision,
        };
        track_best(&mut self.best_iteration, &snapshot, &self.focus);
        self.history.push(snapshot);

        self.scores = Some(patch.scores);
        self.total_score = total_score;
        self.review_feedback = patch.review_feedback;
        self.review_decision = review_decision;
        Ok(())
    }

    /// Record the terminal cause. The first recorded reason wins.
    pub fn record_stop(&mut self, reason: StopReason) -> bool {
        if self.stop_reason.is_some() {
            return false;
        }
        self.stop_reason = Some(reason);
        true
    }

    /// Enter fail-soft mode after a transient failure in `stage`.
    pub fn mark_fail_soft(&mut self, stage: Stage, error: String) {
        self.fail_soft = true;
        self.record_stop(StopReason::FailSoft(stage));
        self.metrics.fail_soft_error = Some(error);
    }

    pub fn record_call(&mut self, stage: Stage) {
        *self.metrics.calls.entry(stage).or_insert(0) += 1;
    }

    /// Deduct the cost of `kind` from the budget.
    pub fn charge(&mut self, kind: CostKind) -> Result<u64, String> {
        self.budget.charge(kind)
    }

    /// Whether the working draft is the one scored by the latest round.
    pub fn draft_is_scored(&self) -> bool {
        self.history
            .last()
            .is_some_and(|round| {
                round.iteration == self.iteration_count && round.draft == self.draft
            })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn style(&self) -> Style {
        self.style
    }

    pub fn intent(&self) -> Option<Intent> {
        self.intent
    }

    pub fn references(&self) -> &[String] {
        &self.references
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    pub fn scores(&self) -> Option<&Scores> {
        self.scores.as_ref()
    }

    pub fn total_score(&self) -> u32 {
        self.total_score
    }

    pub fn review_feedback(&self) -> &str {
        &self.review_feedback
    }

    pub fn review_decision(&self) -> ReviewDecision {
        self.review_decision
    }

    pub fn focus(&self) -> &FocusFactors {
        &self.focus
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn history(&self) -> &[RoundSnapshot] {
        &self.history
    }

    pub fn best_iteration(&self) -> Option<&BestIteration> {
        self.best_iteration.as_ref()
    }

    pub fn budget(&self) -> &BudgetLedger {
        &self.budget
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn fail_soft(&self) -> bool {
        self.fail_soft
    }

    pub fn change_summary(&self) -> Option<&str> {
        self.change_summary.as_deref()
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }
}
