//! Bounded draft-refinement runner.
//!
//! Drafts a post for a topic through an external text service, scores it,
//! and revises it until a stop condition holds. Prints the response on stdout.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;

use refiner::core::types::Style;
use refiner::exit_codes;
use refiner::io::command::CommandCollaborators;
use refiner::io::config::{DEFAULT_CONFIG_FILE, RefinerConfig, load_config, write_config};
use refiner::io::run_report::write_report;
use refiner::logging;
use refiner::pipeline::run_pipeline;
use refiner::request::{DEFAULT_MAX_ITERATIONS, RunReport, RunRequest, RunResponse};

#[derive(Parser)]
#[command(
    name = "refiner",
    version,
    about = "Bounded draft-refinement control loop"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default `refiner.toml`.
    Init {
        /// Overwrite an existing config file.
        #[arg(short, long)]
        force: bool,

        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Draft, score and revise a post for one topic.
    Run {
        /// Content or claim to write about.
        #[arg(long)]
        topic: String,

        #[arg(long, value_enum, default_value_t = Style::default())]
        style: Style,

        /// Revision rounds allowed after the first draft (1..=8).
        #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
        max_iterations: u32,

        #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,

        /// Also write the full run report (history, best iteration) as JSON.
        #[arg(long)]
        report: Option<PathBuf>,

        /// Print only the final draft instead of the JSON response.
        #[arg(long)]
        text: bool,
    },
}

fn main() -> ExitCode {
    logging::init();
    match run() {
        Ok(code) => exit_code(code),
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code(exit_codes::INVALID)
        }
    }
}

fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force, config } => cmd_init(&config, force),
        Command::Run {
            topic,
            style,
            max_iterations,
            config,
            report,
            text,
        } => {
            let request = RunRequest::new(topic, style, max_iterations);
            cmd_run(&request, &config, report.as_deref(), text)
        }
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &RefinerConfig::default())
        .with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), "config written");
    Ok(exit_codes::OK)
}

fn cmd_run(
    request: &RunRequest,
    config_path: &Path,
    report: Option<&Path>,
    text: bool,
) -> Result<i32> {
    let config = load_config(config_path)?;
    let collaborators = CommandCollaborators::new(config.collaborator.clone())?;
    let state = run_pipeline(request, &config, &collaborators)?;

    if let Some(path) = report {
        write_report(path, &RunReport::new(request, &state))
            .with_context(|| format!("write report {}", path.display()))?;
    }

    let response = RunResponse::from_state(&state);
    if text {
        println!("{}", response.final_draft);
    } else {
        let payload = serde_json::to_string_pretty(&response).context("serialize response")?;
        println!("{payload}");
    }

    if response.fail_soft {
        return Ok(exit_codes::FAIL_SOFT);
    }
    Ok(exit_codes::OK)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_init() {
        let cli = Cli::parse_from(["refiner", "init"]);
        assert!(matches!(cli.command, Command::Init { force: false, .. }));
    }

    #[test]
    fn parse_init_force() {
        let cli = Cli::parse_from(["refiner", "init", "--force"]);
        assert!(matches!(cli.command, Command::Init { force: true, .. }));
    }

    #[test]
    fn parse_run_defaults() {
        let cli = Cli::parse_from(["refiner", "run", "--topic", "cutting p99 by 40%"]);
        match cli.command {
            Command::Run {
                topic,
                style,
                max_iterations,
                config,
                report,
                text,
            } => {
                assert_eq!(topic, "cutting p99 by 40%");
                assert_eq!(style, Style::EngineeringDirect);
                assert_eq!(max_iterations, DEFAULT_MAX_ITERATIONS);
                assert_eq!(config, PathBuf::from(DEFAULT_CONFIG_FILE));
                assert!(report.is_none());
                assert!(!text);
            }
            Command::Init { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn parse_run_style() {
        let cli = Cli::parse_from([
            "refiner",
            "run",
            "--topic",
            "t",
            "--style",
            "story_driven",
            "--max-iterations",
            "5",
        ]);
        assert!(matches!(
            cli.command,
            Command::Run {
                style: Style::StoryDriven,
                max_iterations: 5,
                ..
            }
        ));
    }
}
