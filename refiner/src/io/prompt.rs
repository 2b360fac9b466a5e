//! Stage prompt rendering for command-backed collaborators.

use anyhow::{Context, Result};
use minijinja::{Environment, context};

use crate::core::best::BestIteration;
use crate::core::state::{RoundSnapshot, RunState};
use crate::core::types::{Dimension, Stage};

const INTENT_TEMPLATE: &str = include_str!("prompts/intent.md");
const GENERATOR_TEMPLATE: &str = include_str!("prompts/generator.md");
const EVALUATOR_TEMPLATE: &str = include_str!("prompts/evaluator.md");
const OPTIMIZER_TEMPLATE: &str = include_str!("prompts/optimizer.md");
const SUMMARIZER_TEMPLATE: &str = include_str!("prompts/summarizer.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (stage, source) in [
            (Stage::IntentClassifier, INTENT_TEMPLATE),
            (Stage::Generator, GENERATOR_TEMPLATE),
            (Stage::Evaluator, EVALUATOR_TEMPLATE),
            (Stage::Optimizer, OPTIMIZER_TEMPLATE),
            (Stage::Summarizer, SUMMARIZER_TEMPLATE),
        ] {
            env.add_template(stage.as_str(), source)
                .with_context(|| format!("load {stage} template"))?;
        }
        Ok(Self { env })
    }

    pub fn render_intent(&self, state: &RunState) -> Result<String> {
        let template = self.env.get_template(Stage::IntentClassifier.as_str())?;
        Ok(template.render(context! { topic => state.topic().trim() })?)
    }

    pub fn render_generator(&self, state: &RunState) -> Result<String> {
        let template = self.env.get_template(Stage::Generator.as_str())?;
        let rendered = template.render(context! {
            topic => state.topic().trim(),
            intent => state.intent(),
            style => state.style(),
            references => state.references(),
        })?;
        Ok(rendered)
    }

    pub fn render_evaluator(&self, state: &RunState) -> Result<String> {
        let template = self.env.get_template(Stage::Evaluator.as_str())?;
        let dimensions: Vec<&str> = Dimension::ALL.iter().map(|d| d.as_str()).collect();
        let rendered = template.render(context! {
            draft => state.draft().trim(),
            dimensions => dimensions,
        })?;
        Ok(rendered)
    }

    pub fn render_optimizer(&self, state: &RunState) -> Result<String> {
        let template = self.env.get_template(Stage::Optimizer.as_str())?;
        let rendered = template.render(context! {
            intent => state.intent(),
            style => state.style(),
            focus => state.focus().active(),
            feedback => state.review_feedback().trim(),
            draft => state.draft().trim(),
        })?;
        Ok(rendered)
    }

    pub fn render_summarizer(
        &self,
        initial: &RoundSnapshot,
        best: &BestIteration,
    ) -> Result<String> {
        let template = self.env.get_template(Stage::Summarizer.as_str())?;
        let focus: Vec<Dimension> = best.focus.frozen().map(Vec::from).unwrap_or_default();
        let rendered = template.render(context! {
            initial_iteration => initial.iteration,
            initial_feedback => initial.review_feedback.trim(),
            best_iteration => best.iteration,
            best_feedback => best.review_feedback.trim(),
            focus => focus,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::state::{DraftPatch, IntentPatch, StagePatch};
    use crate::core::types::Intent;
    use crate::test_support::{evaluation, new_state, scores};

    #[test]
    fn evaluator_prompt_lists_every_dimension() {
        let engine = PromptEngine::new().expect("engine");
        let state = new_state(3, 10_000);
        let prompt = engine.render_evaluator(&state).expect("render");
        for dim in Dimension::ALL {
            assert!(prompt.contains(dim.as_str()), "missing {dim}");
        }
    }

    #[test]
    fn optimizer_prompt_switches_on_intent_and_lists_focus() {
        let engine = PromptEngine::new().expect("engine");
        let mut state = new_state(3, 10_000);
        state
            .apply(StagePatch::Intent(IntentPatch {
                intent: Intent::TechThoughtLeadership,
            }))
            .expect("intent");
        state
            .apply(StagePatch::Draft(DraftPatch {
                draft: "draft body".to_string(),
            }))
            .expect("draft");
        state
            .apply(StagePatch::Evaluation(evaluation(scores(5, 9, 4, 9, 9), 36)))
            .expect("evaluation");

        let prompt = engine.render_optimizer(&state).expect("render");
        assert!(prompt.contains("thought leadership"));
        assert!(prompt.contains("density, hook"));
        assert!(prompt.contains("draft body"));
    }

    #[test]
    fn summarizer_prompt_uses_frozen_focus() {
        let engine = PromptEngine::new().expect("engine");
        let mut state = new_state(3, 10_000);
        state
            .apply(StagePatch::Evaluation(evaluation(scores(5, 9, 4, 9, 9), 36)))
            .expect("evaluation");
        let initial = state.history()[0].clone();
        let best = state.best_iteration().expect("best").clone();

        let prompt = engine.render_summarizer(&initial, &best).expect("render");
        assert!(prompt.contains("Focus dimensions: density, hook"));
    }
}
