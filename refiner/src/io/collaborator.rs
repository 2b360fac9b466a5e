//! Collaborator abstraction for the generative stages of a run.
//!
//! The [`Collaborators`] trait decouples the pipeline driver from the text
//! service backend. Each stage receives the run state and returns only the
//! patch type it is allowed to produce. Tests use scripted collaborators that
//! return predetermined patches without spawning processes.

use crate::core::best::BestIteration;
use crate::core::state::{
    DraftPatch, EvaluationPatch, IntentPatch, ReferencesPatch, RevisionPatch, RoundSnapshot,
    RunState, SummaryPatch,
};
use crate::core::types::CollaboratorError;

pub trait Collaborators {
    /// Pick the content-intent category for the topic. Not charged.
    fn classify_intent(&self, state: &RunState) -> Result<IntentPatch, CollaboratorError>;

    /// Gather reference material. Not charged; the default finds nothing.
    fn retrieve_references(&self, _state: &RunState) -> Result<ReferencesPatch, CollaboratorError> {
        Ok(ReferencesPatch::default())
    }

    /// Produce the first draft from topic, intent and style.
    fn generate(&self, state: &RunState) -> Result<DraftPatch, CollaboratorError>;

    /// Score the working draft on every dimension.
    fn evaluate(&self, state: &RunState) -> Result<EvaluationPatch, CollaboratorError>;

    /// Revise the working draft using the latest feedback.
    fn revise(&self, state: &RunState) -> Result<RevisionPatch, CollaboratorError>;

    /// Describe what changed between the first round and the best round.
    fn summarize(
        &self,
        initial: &RoundSnapshot,
        best: &BestIteration,
    ) -> Result<SummaryPatch, CollaboratorError>;
}
