//! Refiner configuration stored in `refiner.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::budget::{BudgetLedger, CostTable};
use crate::core::state::LoopSettings;
use crate::core::types::{MAX_DIMENSION_SCORE, MAX_TOTAL_SCORE};

pub const DEFAULT_CONFIG_FILE: &str = "refiner.toml";

/// Refiner configuration (TOML).
///
/// Intended to be edited by humans. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RefinerConfig {
    /// Cost units available to one run.
    pub budget_units: u64,

    /// Round-0 total at or above which the first draft is kept unrevised.
    pub strong_draft_threshold: u32,

    /// Dimension score at which a focus factor graduates.
    pub focus_graduation_threshold: u8,

    /// Total at or above which a draft is marked `accept`.
    pub accept_threshold: u32,

    pub costs: CostTable,

    pub collaborator: CollaboratorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollaboratorConfig {
    /// Command that receives a prompt on stdin and answers on stdout.
    pub command: Vec<String>,

    /// Per-call wall-clock limit in seconds.
    pub timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "codex".to_string(),
                "exec".to_string(),
                "--skip-git-repo-check".to_string(),
                "-".to_string(),
            ],
            timeout_secs: 120,
            output_limit_bytes: 100_000,
        }
    }
}

impl CollaboratorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RefinerConfig {
    fn default() -> Self {
        let settings = LoopSettings::default();
        Self {
            budget_units: 8_000,
            strong_draft_threshold: settings.strong_draft_threshold,
            focus_graduation_threshold: settings.focus_graduation_threshold,
            accept_threshold: settings.accept_threshold,
            costs: CostTable::default(),
            collaborator: CollaboratorConfig::default(),
        }
    }
}

impl RefinerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.strong_draft_threshold > MAX_TOTAL_SCORE {
            return Err(anyhow!(
                "strong_draft_threshold must be <= {MAX_TOTAL_SCORE}"
            ));
        }
        if self.accept_threshold > MAX_TOTAL_SCORE {
            return Err(anyhow!("accept_threshold must be <= {MAX_TOTAL_SCORE}"));
        }
        if self.focus_graduation_threshold == 0
            || self.focus_graduation_threshold > MAX_DIMENSION_SCORE
        {
            return Err(anyhow!(
                "focus_graduation_threshold must be in 1..={MAX_DIMENSION_SCORE}"
            ));
        }
        if self.collaborator.timeout_secs == 0 {
            return Err(anyhow!("collaborator.timeout_secs must be > 0"));
        }
        if self.collaborator.output_limit_bytes == 0 {
            return Err(anyhow!("collaborator.output_limit_bytes must be > 0"));
        }
        if self.collaborator.command.is_empty() || self.collaborator.command[0].trim().is_empty()
        {
            return Err(anyhow!("collaborator.command must be a non-empty array"));
        }
        Ok(())
    }

    pub fn loop_settings(&self) -> LoopSettings {
        LoopSettings {
            strong_draft_threshold: self.strong_draft_threshold,
            focus_graduation_threshold: self.focus_graduation_threshold,
            accept_threshold: self.accept_threshold,
        }
    }

    /// Fresh per-run budget.
    pub fn budget_ledger(&self) -> BudgetLedger {
        BudgetLedger::new(self.budget_units, self.costs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RefinerConfig::default()`.
pub fn load_config(path: &Path) -> Result<RefinerConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing, using defaults");
        let cfg = RefinerConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RefinerConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), budget_units = cfg.budget_units, "config loaded");
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RefinerConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
