//! Collaborators backed by an external command.
//!
//! Every stage renders a prompt, pipes it to the configured command on stdin,
//! and reads the answer from stdout. The stage name is exported as
//! `REFINER_STAGE` so a single wrapper script can route stages to different
//! models. Structured stages must answer with JSON matching the schemas under
//! `schemas/`.

use std::io::ErrorKind;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use jsonschema::{Draft, Validator};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::core::best::BestIteration;
use crate::core::state::{
    DraftPatch, EvaluationPatch, IntentPatch, RevisionPatch, RoundSnapshot, RunState, SummaryPatch,
};
use crate::core::types::{CollaboratorError, Stage};
use crate::io::collaborator::Collaborators;
use crate::io::config::CollaboratorConfig;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::PromptEngine;

const INTENT_SCHEMA: &str = include_str!("../../schemas/intent.schema.json");
const EVALUATION_SCHEMA: &str = include_str!("../../schemas/evaluation.schema.json");
const SUMMARY_SCHEMA: &str = include_str!("../../schemas/summary.schema.json");

/// Environment variable naming the stage being invoked.
pub const STAGE_ENV: &str = "REFINER_STAGE";

struct Schemas {
    intent: Validator,
    evaluation: Validator,
    summary: Validator,
}

impl Schemas {
    fn compile() -> Result<Self> {
        Ok(Self {
            intent: compile_schema(INTENT_SCHEMA).context("compile intent schema")?,
            evaluation: compile_schema(EVALUATION_SCHEMA).context("compile evaluation schema")?,
            summary: compile_schema(SUMMARY_SCHEMA).context("compile summary schema")?,
        })
    }
}

/// Compile a JSON Schema (Draft 2020-12).
fn compile_schema(raw: &str) -> Result<Validator> {
    let schema: Value = serde_json::from_str(raw).context("parse schema json")?;
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("build schema: {err}"))
}

/// [`Collaborators`] implementation that shells out to a text service command.
pub struct CommandCollaborators {
    config: CollaboratorConfig,
    prompts: PromptEngine,
    schemas: Schemas,
}

impl CommandCollaborators {
    pub fn new(config: CollaboratorConfig) -> Result<Self> {
        if config.command.is_empty() {
            return Err(anyhow!("collaborator.command must be a non-empty array"));
        }
        Ok(Self {
            config,
            prompts: PromptEngine::new()?,
            schemas: Schemas::compile()?,
        })
    }

    /// Run the command for `stage` and return its stdout.
    #[instrument(skip_all, fields(stage = %stage, timeout_secs = self.config.timeout_secs))]
    fn invoke(&self, stage: Stage, prompt: Result<String>) -> Result<String, CollaboratorError> {
        let prompt = prompt.map_err(|err| {
            CollaboratorError::Contract(format!("render {stage} prompt: {err:#}"))
        })?;

        let mut cmd = Command::new(&self.config.command[0]);
        cmd.args(&self.config.command[1..])
            .env(STAGE_ENV, stage.as_str());

        let output = run_command_with_timeout(
            cmd,
            Some(prompt.as_bytes()),
            self.config.timeout(),
            self.config.output_limit_bytes,
        )
        .map_err(|err| launch_error(stage, &err))?;

        if output.timed_out {
            warn!("collaborator command timed out");
            return Err(CollaboratorError::Timeout(format!(
                "{stage} exceeded {}s",
                self.config.timeout_secs
            )));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "collaborator command failed");
            return Err(CollaboratorError::Remote(format!(
                "{stage} exited with status {:?}: {}",
                output.status.code(),
                output.stderr_tail(5)
            )));
        }
        debug!(stdout_bytes = output.stdout.len(), "collaborator answered");
        Ok(output.stdout_lossy())
    }

    fn invoke_text(
        &self,
        stage: Stage,
        prompt: Result<String>,
    ) -> Result<String, CollaboratorError> {
        let text = self.invoke(stage, prompt)?;
        let text = text.trim();
        if text.is_empty() {
            return Err(CollaboratorError::Contract(format!(
                "{stage} returned empty output"
            )));
        }
        Ok(text.to_string())
    }

    fn invoke_json<T: DeserializeOwned>(
        &self,
        stage: Stage,
        prompt: Result<String>,
        schema: &Validator,
    ) -> Result<T, CollaboratorError> {
        let raw = self.invoke(stage, prompt)?;
        parse_structured(&raw, schema)
            .map_err(|err| CollaboratorError::Contract(format!("{stage}: {err:#}")))
    }
}

impl Collaborators for CommandCollaborators {
    fn classify_intent(&self, state: &RunState) -> Result<IntentPatch, CollaboratorError> {
        self.invoke_json(
            Stage::IntentClassifier,
            self.prompts.render_intent(state),
            &self.schemas.intent,
        )
    }

    fn generate(&self, state: &RunState) -> Result<DraftPatch, CollaboratorError> {
        let draft = self.invoke_text(Stage::Generator, self.prompts.render_generator(state))?;
        Ok(DraftPatch { draft })
    }

    fn evaluate(&self, state: &RunState) -> Result<EvaluationPatch, CollaboratorError> {
        self.invoke_json(
            Stage::Evaluator,
            self.prompts.render_evaluator(state),
            &self.schemas.evaluation,
        )
    }

    fn revise(&self, state: &RunState) -> Result<RevisionPatch, CollaboratorError> {
        let draft = self.invoke_text(Stage::Optimizer, self.prompts.render_optimizer(state))?;
        Ok(RevisionPatch { draft })
    }

    fn summarize(
        &self,
        initial: &RoundSnapshot,
        best: &BestIteration,
    ) -> Result<SummaryPatch, CollaboratorError> {
        self.invoke_json(
            Stage::Summarizer,
            self.prompts.render_summarizer(initial, best),
            &self.schemas.summary,
        )
    }
}

/// A command that cannot be found or executed is a configuration problem and
/// will not succeed on retry. Other launch failures are treated as transient.
fn launch_error(stage: Stage, err: &anyhow::Error) -> CollaboratorError {
    let io_kind = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<std::io::Error>())
        .map(std::io::Error::kind);
    let message = format!("{stage}: {err:#}");
    match io_kind {
        Some(ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
            CollaboratorError::Contract(message)
        }
        _ => CollaboratorError::Remote(message),
    }
}

/// Parse a JSON answer, tolerating surrounding prose or a fenced code block.
fn parse_structured<T: DeserializeOwned>(raw: &str, schema: &Validator) -> Result<T> {
    let body = extract_json_object(raw).ok_or_else(|| anyhow!("no JSON object in output"))?;
    let value: Value = serde_json::from_str(body).context("parse output json")?;
    let messages: Vec<String> = schema
        .iter_errors(&value)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    serde_json::from_value(value).context("decode output")
}

fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}
