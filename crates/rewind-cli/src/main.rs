//! # rewind
//!
//! Inspect and resume agent sessions from their JSONL run logs. Every
//! subcommand prints JSON on stdout; diagnostics go to stderr.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rewind_core::logging::init_subscriber_with_format;
use rewind_events::{ParsedLog, SessionEvent, build_timeline, parse_log, replay_conversation};
use rewind_resume::{
    FsLogSource, GitTreeRestorer, ResumeOptions, ResumeOrchestrator, RunMetadata,
    StaticRunMetadata,
};
use rewind_settings::RewindSettings;
use serde::Serialize;

/// Agent session inspector.
#[derive(Parser, Debug)]
#[command(name = "rewind", about = "Inspect and resume agent sessions")]
struct Cli {
    /// Log level for diagnostics (overrides settings).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the live turn timeline of a run log.
    Timeline {
        /// Path to the JSONL run log.
        log: PathBuf,
    },
    /// Print the conversation rebuilt from a run log.
    Replay {
        /// Path to the JSONL run log.
        log: PathBuf,
    },
    /// Restore the working tree and rebuild the conversation of a run.
    Resume {
        /// Run log location. Relative paths resolve against the logs directory.
        #[arg(long)]
        log: String,

        /// Working tree to restore into (overrides settings).
        #[arg(long)]
        workdir: Option<PathBuf>,

        /// Skip working-tree restoration.
        #[arg(long)]
        no_restore: bool,
    },
}

async fn read_log(path: &Path) -> Result<ParsedLog> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read run log: {}", path.display()))?;
    let parsed = parse_log(&content);
    if parsed.skipped > 0 {
        tracing::warn!(path = %path.display(), skipped = parsed.skipped, "some log lines could not be decoded");
    }
    Ok(parsed)
}

fn render<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

fn run_id(location: &str) -> String {
    Path::new(location)
        .file_stem()
        .map_or_else(|| location.to_string(), |s| s.to_string_lossy().into_owned())
}

fn orchestrator(
    settings: &RewindSettings,
    log: &str,
    workdir: Option<PathBuf>,
    no_restore: bool,
) -> ResumeOrchestrator {
    let metadata = StaticRunMetadata(RunMetadata {
        run_id: run_id(log),
        log_location: Some(log.to_string()),
    });
    let workdir = workdir.unwrap_or_else(|| settings.resume.working_directory());
    let restorer = GitTreeRestorer::new(workdir).with_git_binary(settings.resume.git_binary.clone());

    let mut options = ResumeOptions::from(&settings.resume);
    if no_restore {
        options.restore_tree = false;
    }

    ResumeOrchestrator::new(
        Arc::new(metadata),
        Arc::new(FsLogSource::new(settings.logs.directory())),
        Arc::new(restorer),
    )
    .with_options(options)
}

async fn run(command: Command, settings: &RewindSettings) -> Result<String> {
    match command {
        Command::Timeline { log } => {
            let parsed = read_log(&log).await?;
            let events = SessionEvent::from_stored(&parsed.entries);
            render(&build_timeline(&events))
        }
        Command::Replay { log } => {
            let parsed = read_log(&log).await?;
            render(&replay_conversation(&parsed.entries))
        }
        Command::Resume {
            log,
            workdir,
            no_restore,
        } => {
            let result = orchestrator(settings, &log, workdir, no_restore)
                .resume()
                .await
                .with_context(|| format!("Failed to resume run from {log}"))?;
            if result.is_degraded() {
                tracing::info!("snapshot found but working tree was not restored");
            }
            render(&result)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = rewind_settings::get_settings();
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(settings.logging.level.as_str());
    init_subscriber_with_format(level, settings.logging.format);

    let output = run(cli.command, settings).await?;
    println!("{output}");
    Ok(())
}
