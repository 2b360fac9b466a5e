//! Test-only helpers: deterministic scores, states and scripted collaborators.

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use crate::core::best::BestIteration;
use crate::core::budget::{BudgetLedger, CostTable};
use crate::core::state::{
    DraftPatch, EvaluationPatch, IntentPatch, LoopSettings, ReferencesPatch, RevisionPatch,
    RoundSnapshot, RunState, SummaryPatch,
};
use crate::core::types::{
    CollaboratorError, Dimension, Intent, ReviewDecision, Scores, Stage, Style,
};
use crate::io::collaborator::Collaborators;
use crate::request::RunRequest;

/// Build complete scores in `Dimension` order: hook, structure, density, grounding, voice.
pub fn scores(hook: u8, structure: u8, density: u8, grounding: u8, voice: u8) -> Scores {
    Scores::from_pairs(&[
        (Dimension::Hook, hook),
        (Dimension::Structure, structure),
        (Dimension::Density, density),
        (Dimension::Grounding, grounding),
        (Dimension::Voice, voice),
    ])
    .expect("valid test scores")
}

/// Evaluation patch with an explicit total and canned feedback.
pub fn evaluation(scores: Scores, total: u32) -> EvaluationPatch {
    EvaluationPatch {
        scores,
        total_score: Some(total),
        review_feedback: format!("feedback for total {total}"),
    }
}

/// Fresh state for "test topic" with default loop settings and costs.
pub fn new_state(max_iterations: u32, budget: u64) -> RunState {
    let request = RunRequest::new("test topic", Style::EngineeringDirect, max_iterations);
    RunState::new(
        &request,
        LoopSettings::default(),
        BudgetLedger::new(budget, CostTable::default()),
    )
}

/// Standalone round snapshot; the total is the sum of `scores`.
pub fn round(iteration: u32, scores: Scores) -> RoundSnapshot {
    let total_score = scores.sum();
    let accept_threshold = LoopSettings::default().accept_threshold;
    RoundSnapshot {
        iteration,
        draft: format!("v{iteration}"),
        scores,
        total_score,
        review_feedback: String::new(),
        review_decision: ReviewDecision::from_total(total_score, accept_threshold),
    }
}

/// Inputs passed to [`Collaborators::summarize`].
#[derive(Debug, Clone)]
pub struct SummarizerInput {
    pub initial: RoundSnapshot,
    pub best: BestIteration,
}

/// Collaborators that replay queued evaluations and never spawn processes.
///
/// The generator returns `v0`; each revision returns `v{iteration + 1}` unless
/// revisions were queued. Any stage can be made to fail with
/// [`ScriptedCollaborators::fail_stage`]; a failure on the evaluator or
/// optimizer can be deferred to the nth call with
/// [`ScriptedCollaborators::fail_stage_on_call`].
pub struct ScriptedCollaborators {
    intent: Intent,
    evaluations: RefCell<VecDeque<EvaluationPatch>>,
    revisions: RefCell<VecDeque<String>>,
    failures: BTreeMap<Stage, (u32, CollaboratorError)>,
    summary: Option<String>,
    calls: RefCell<Vec<Stage>>,
    summarizer_inputs: RefCell<Vec<SummarizerInput>>,
}

impl ScriptedCollaborators {
    pub fn new(evaluations: Vec<EvaluationPatch>) -> Self {
        Self {
            intent: Intent::ProofOfWork,
            evaluations: RefCell::new(evaluations.into()),
            revisions: RefCell::new(VecDeque::new()),
            failures: BTreeMap::new(),
            summary: Some("tightened the opening and cut filler".to_string()),
            calls: RefCell::new(Vec::new()),
            summarizer_inputs: RefCell::new(Vec::new()),
        }
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_revisions(self, revisions: Vec<&str>) -> Self {
        *self.revisions.borrow_mut() = revisions.into_iter().map(str::to_string).collect();
        self
    }

    /// Fail the first call to `stage`.
    pub fn fail_stage(self, stage: Stage, err: CollaboratorError) -> Self {
        self.fail_stage_on_call(stage, 1, err)
    }

    /// Fail the `nth` (1-based) call to `stage`; earlier calls succeed.
    pub fn fail_stage_on_call(mut self, stage: Stage, nth: u32, err: CollaboratorError) -> Self {
        self.failures.insert(stage, (nth, err));
        self
    }

    /// Stages invoked so far, in order.
    pub fn calls(&self) -> Vec<Stage> {
        self.calls.borrow().clone()
    }

    pub fn summarizer_inputs(&self) -> Vec<SummarizerInput> {
        self.summarizer_inputs.borrow().clone()
    }

    fn enter(&self, stage: Stage) -> Result<(), CollaboratorError> {
        let mut calls = self.calls.borrow_mut();
        calls.push(stage);
        let count = calls.iter().filter(|s| **s == stage).count() as u32;
        match self.failures.get(&stage) {
            Some((nth, err)) if *nth == count => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

impl Collaborators for ScriptedCollaborators {
    fn classify_intent(&self, _state: &RunState) -> Result<IntentPatch, CollaboratorError> {
        self.enter(Stage::IntentClassifier)?;
        Ok(IntentPatch {
            intent: self.intent,
        })
    }

    fn retrieve_references(&self, _state: &RunState) -> Result<ReferencesPatch, CollaboratorError> {
        self.enter(Stage::ReferenceRetriever)?;
        Ok(ReferencesPatch::default())
    }

    fn generate(&self, _state: &RunState) -> Result<DraftPatch, CollaboratorError> {
        self.enter(Stage::Generator)?;
        Ok(DraftPatch {
            draft: "v0".to_string(),
        })
    }

    fn evaluate(&self, _state: &RunState) -> Result<EvaluationPatch, CollaboratorError> {
        self.enter(Stage::Evaluator)?;
        self.evaluations
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| CollaboratorError::Contract("no scripted evaluation left".to_string()))
    }

    fn revise(&self, state: &RunState) -> Result<RevisionPatch, CollaboratorError> {
        self.enter(Stage::Optimizer)?;
        let draft = self
            .revisions
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| format!("v{}", state.iteration_count() + 1));
        Ok(RevisionPatch { draft })
    }

    fn summarize(
        &self,
        initial: &RoundSnapshot,
        best: &BestIteration,
    ) -> Result<SummaryPatch, CollaboratorError> {
        self.summarizer_inputs.borrow_mut().push(SummarizerInput {
            initial: initial.clone(),
            best: best.clone(),
        });
        self.enter(Stage::Summarizer)?;
        Ok(SummaryPatch {
            summary: self.summary.clone(),
        })
    }
}
