//! Idea Unpacker CLI
//!
//! The `unpacker` command turns a topic into a short written artifact.
//!
//! ## Commands
//!
//! - `run`: generate, score, checkpoint, refine; writes a run artifact
//! - `replay`: verify a run artifact and re-derive its outcome from provenance

mod config_file;
mod terminal;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use unpacker_core::{
    read_artifact_file, replay, write_run_artifact, PipelineOutput, ProvenanceTracker,
    StageSequencer, Topic,
};
use unpacker_gateway::HttpGateway;

use crate::config_file::{Overrides, TomlConfig};
use crate::terminal::TerminalHuman;

#[derive(Parser)]
#[command(name = "unpacker")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Unpack a topic into a compressed artifact through several model backends", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline for a topic
    Run {
        /// Topic, at most 50 characters
        #[arg(short, long)]
        topic: String,

        /// One-sentence intent
        #[arg(short, long)]
        intent: Option<String>,

        /// Outline point; repeat for several
        #[arg(long)]
        outline: Vec<String>,

        /// Config file (default: ./unpacker.toml if present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory run artifacts are written under
        #[arg(short, long, default_value = "runs", env = "UNPACKER_OUTPUT_DIR")]
        output_dir: PathBuf,

        #[command(flatten)]
        overrides: Overrides,
    },

    /// Verify a run artifact and replay its provenance log
    Replay {
        /// Path to an output.json written by `run`
        artifact: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    unpacker_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            topic,
            intent,
            outline,
            config,
            output_dir,
            overrides,
        } => {
            cmd_run(
                &topic,
                intent.as_deref(),
                outline,
                TomlConfig::new(config, overrides),
                &output_dir,
            )
            .await
        }
        Commands::Replay { artifact } => cmd_replay(&artifact),
    }
}

async fn cmd_run(
    topic: &str,
    intent: Option<&str>,
    outline: Vec<String>,
    provider: TomlConfig,
    output_dir: &Path,
) -> Result<()> {
    let topic = Topic::new(topic, intent)
        .context("Invalid topic")?
        .with_outline(outline);

    let file = provider.read_file().context("Failed to read configuration")?;
    let config = provider
        .resolve(&file)
        .context("Invalid configuration")?;

    let gateway = HttpGateway::from_env(file.provider_specs(), file.timeout())
        .context("Failed to create model gateway")?;
    gateway
        .check_roster(&config.backends)
        .context("Backend roster is not usable")?;

    let sequencer = StageSequencer::new(
        Arc::new(gateway),
        Arc::new(TerminalHuman::stdio()),
        config,
    )?;

    let mut tracker = ProvenanceTracker::new();
    let output = sequencer.run(topic, &mut tracker).await?;

    let path = write_run_artifact(&output, output_dir)
        .with_context(|| format!("Failed to write run artifact under {:?}", output_dir))?;
    info!(run_id = %output.run_id, path = %path.display(), "run artifact written");

    print_output(&output);
    println!("\nArtifact: {}", path.display());
    Ok(())
}

fn print_output(output: &PipelineOutput) {
    println!("Run {}: {}", output.run_id, output.status);
    if let Some(idea) = &output.selected_idea {
        println!("Idea: {} ({})", idea.name, idea.source);
    }
    if let Some(text) = &output.final_text {
        println!("\n{text}");
    }
    if let Some(explainer) = output.explainer.as_deref().filter(|e| !e.is_empty()) {
        println!("\n{explainer}");
    }
    if let Some(score) = output.final_score {
        println!(
            "\nScore {:.1} after {} cycle(s), draft v{}",
            score,
            output.cycles_used,
            output.best_draft_version.unwrap_or_default()
        );
    }
    if let Some(report) = &output.failure_report {
        println!("\nDid not converge: {}", report.likely_cause);
        println!("Hint: {}", report.likely_cause.hint());
        if let Some(summary) = &report.summary {
            println!("{summary}");
        }
    }
}

fn cmd_replay(artifact: &Path) -> Result<()> {
    let output = read_artifact_file(artifact)
        .with_context(|| format!("Failed to load run artifact {:?}", artifact))?;
    let summary = replay(&output.provenance_log)
        .with_context(|| format!("Replay failed for run {}", output.run_id))?;

    if summary.status != output.status || summary.best_draft_version != output.best_draft_version
    {
        anyhow::bail!(
            "Replay of run {} disagrees with its artifact: replayed {} (v{:?}), recorded {} (v{:?})",
            output.run_id,
            summary.status,
            summary.best_draft_version,
            output.status,
            output.best_draft_version
        );
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_args_parse() {
        let cli = Cli::try_parse_from([
            "unpacker",
            "run",
            "--topic",
            "grief",
            "--outline",
            "objects",
            "--outline",
            "voices",
            "--word-limit",
            "80",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                topic,
                outline,
                overrides,
                ..
            } => {
                assert_eq!(topic, "grief");
                assert_eq!(outline, vec!["objects", "voices"]);
                assert_eq!(overrides.word_limit, Some(80));
            }
            Commands::Replay { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_replay_rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(cmd_replay(&dir.path().join("output.json")).is_err());
    }
}
