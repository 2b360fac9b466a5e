//! Shared deterministic types for the refinement core.
//!
//! These types define stable contracts between the control loop and its
//! collaborators. They must not depend on external state or I/O.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

/// Highest score a single dimension can receive.
pub const MAX_DIMENSION_SCORE: u8 = 10;

/// Highest aggregate score across all dimensions.
pub const MAX_TOTAL_SCORE: u32 = MAX_DIMENSION_SCORE as u32 * Dimension::ALL.len() as u32;

/// Quality dimension scored by the evaluator.
///
/// The set is closed: the evaluator must score every variant every round, and
/// declaration order is the tie-break when selecting focus factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Hook,
    Structure,
    Density,
    Grounding,
    Voice,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Hook,
        Dimension::Structure,
        Dimension::Density,
        Dimension::Grounding,
        Dimension::Voice,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Hook => "hook",
            Dimension::Structure => "structure",
            Dimension::Density => "density",
            Dimension::Grounding => "grounding",
            Dimension::Voice => "voice",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-dimension scores for one evaluation round.
///
/// Always complete: every [`Dimension`] has exactly one score in
/// `0..=MAX_DIMENSION_SCORE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<Dimension, u8>", into = "BTreeMap<Dimension, u8>")]
pub struct Scores(BTreeMap<Dimension, u8>);

impl Scores {
    pub fn new(values: BTreeMap<Dimension, u8>) -> Result<Self, String> {
        let missing: Vec<&str> = Dimension::ALL
            .iter()
            .filter(|dim| !values.contains_key(dim))
            .map(|dim| dim.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(format!("scores missing dimensions: {}", missing.join(", ")));
        }
        if let Some((dim, value)) = values.iter().find(|(_, v)| **v > MAX_DIMENSION_SCORE) {
            return Err(format!(
                "score for {dim} is {value}, expected 0..={MAX_DIMENSION_SCORE}"
            ));
        }
        Ok(Self(values))
    }

    /// Build scores from `(dimension, score)` pairs.
    pub fn from_pairs(pairs: &[(Dimension, u8)]) -> Result<Self, String> {
        Self::new(pairs.iter().copied().collect())
    }

    pub fn get(&self, dim: Dimension) -> u8 {
        // Completeness is checked at construction.
        self.0.get(&dim).copied().unwrap_or_default()
    }

    pub fn sum(&self) -> u32 {
        self.0.values().map(|v| u32::from(*v)).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Dimension, u8)> + '_ {
        self.0.iter().map(|(dim, value)| (*dim, *value))
    }
}

impl TryFrom<BTreeMap<Dimension, u8>> for Scores {
    type Error = String;

    fn try_from(values: BTreeMap<Dimension, u8>) -> Result<Self, Self::Error> {
        Self::new(values)
    }
}

impl From<Scores> for BTreeMap<Dimension, u8> {
    fn from(scores: Scores) -> Self {
        scores.0
    }
}

/// Content-intent category chosen by the intent classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    ProofOfWork,
    TechThoughtLeadership,
}

/// Framing style requested by the caller. Controls framing, not allowed facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Style {
    #[default]
    EngineeringDirect,
    ViralEngineer,
    StoryDriven,
}

/// Code-decided review verdict for a scored draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Accept,
    Revise,
}

impl ReviewDecision {
    /// The evaluator's own opinion is ignored; acceptance is a hard gate on the total.
    pub fn from_total(total_score: u32, accept_threshold: u32) -> Self {
        if total_score >= accept_threshold {
            ReviewDecision::Accept
        } else {
            ReviewDecision::Revise
        }
    }
}

/// Pipeline stage that calls an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    IntentClassifier,
    ReferenceRetriever,
    Generator,
    Evaluator,
    Optimizer,
    Summarizer,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::IntentClassifier => "intent_classifier",
            Stage::ReferenceRetriever => "reference_retriever",
            Stage::Generator => "generator",
            Stage::Evaluator => "evaluator",
            Stage::Optimizer => "optimizer",
            Stage::Summarizer => "summarizer",
        }
    }

    /// Cost kind charged before calling this stage, if any.
    pub fn cost_kind(self) -> Option<CostKind> {
        match self {
            Stage::IntentClassifier | Stage::ReferenceRetriever => None,
            Stage::Generator => Some(CostKind::Generate),
            Stage::Evaluator => Some(CostKind::Evaluate),
            Stage::Optimizer => Some(CostKind::Revise),
            Stage::Summarizer => Some(CostKind::Summarize),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chargeable operation kinds tracked by the budget ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Generate,
    Evaluate,
    Revise,
    Summarize,
}

/// Terminal cause of a run. Recorded once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    StrongInitialDraft,
    FirstIterationFocusRegressed,
    ActiveFocusRegressed,
    NonFocusRegressed,
    FocusGraduated,
    MaxIterationsReached,
    TokenBudgetExceeded,
    FailSoft(Stage),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::StrongInitialDraft => f.write_str("strong_initial_draft"),
            StopReason::FirstIterationFocusRegressed => {
                f.write_str("first_iteration_focus_regressed")
            }
            StopReason::ActiveFocusRegressed => f.write_str("active_focus_regressed"),
            StopReason::NonFocusRegressed => f.write_str("non_focus_regressed"),
            StopReason::FocusGraduated => f.write_str("focus_graduated"),
            StopReason::MaxIterationsReached => f.write_str("max_iterations_reached"),
            StopReason::TokenBudgetExceeded => f.write_str("token_budget_exceeded"),
            StopReason::FailSoft(stage) => write!(f, "{stage}_fail_soft"),
        }
    }
}

impl Serialize for StopReason {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Failure reported by an external collaborator.
///
/// `Timeout` and `Remote` are transient and end the run fail-soft. `Contract`
/// means the collaborator broke its output contract and is never swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    Timeout(String),
    Remote(String),
    Contract(String),
}

impl CollaboratorError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CollaboratorError::Timeout(_) | CollaboratorError::Remote(_)
        )
    }
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollaboratorError::Timeout(msg) => write!(f, "collaborator timed out: {msg}"),
            CollaboratorError::Remote(msg) => write!(f, "collaborator failed: {msg}"),
            CollaboratorError::Contract(msg) => write!(f, "collaborator contract violation: {msg}"),
        }
    }
}

impl std::error::Error for CollaboratorError {}
