//! Command-line interface for seoflow.
//!
//! Provides commands for running a pipeline on a topic, validating and
//! inspecting pipeline files, browsing snapshots and showing configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::{self, Settings};
use crate::core::snapshot_store::topic_hash;
use crate::core::{
    list_snapshots, load_snapshot, FailurePolicy, JournalObserver, LogObserver, OrchestratorConfig,
    Pipeline, RunJournal,
};
use crate::domain::{value_text, Brief, BriefStatus};

/// Pipeline used when `--pipeline` is not given
pub const DEFAULT_PIPELINE: &str = "seo_article";

/// seoflow - sequential SEO article pipeline orchestrator
#[derive(Parser, Debug)]
#[command(name = "seoflow")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a pipeline for a topic
    Run {
        /// Topic of the article
        topic: String,

        /// Pipeline name (looks in the pipelines directory) or path to a YAML file
        #[arg(short, long, default_value = DEFAULT_PIPELINE)]
        pipeline: String,

        /// Write snapshots here instead of the configured cache directory
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,

        /// Disable snapshots for this run
        #[arg(long, conflicts_with = "snapshot_dir")]
        no_snapshots: bool,

        /// Keep running later steps after a failure
        #[arg(long)]
        continue_on_failure: bool,

        /// Print the whole brief as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate a pipeline file
    Validate {
        /// Pipeline name or path
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: String,
    },

    /// Print the resolved step order of a pipeline
    Steps {
        /// Pipeline name or path
        #[arg(default_value = DEFAULT_PIPELINE)]
        pipeline: String,
    },

    /// List snapshots in the cache directory
    Snapshots {
        /// Only show snapshots for this topic
        #[arg(short, long)]
        topic: Option<String>,

        /// Maximum number of snapshots to show (most recent)
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Directory to read instead of the configured cache directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Show a snapshot file
    Show {
        /// Path to the snapshot
        file: PathBuf,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let settings = config::load_settings()?;

        match self.command {
            Commands::Run {
                topic,
                pipeline,
                snapshot_dir,
                no_snapshots,
                continue_on_failure,
                json,
            } => {
                let options = RunOptions {
                    snapshot_dir,
                    no_snapshots,
                    continue_on_failure,
                    json,
                };
                run_topic(&settings, &topic, &pipeline, options).await
            }
            Commands::Validate { pipeline } => validate_pipeline(&settings, &pipeline),
            Commands::Steps { pipeline } => show_steps(&settings, &pipeline),
            Commands::Snapshots { topic, limit, dir } => {
                let dir = dir.unwrap_or_else(|| settings.cache_dir.clone());
                show_snapshots(&dir, topic.as_deref(), limit)
            }
            Commands::Show { file } => show_snapshot(&file),
            Commands::Config => show_config(&settings),
        }
    }
}

struct RunOptions {
    snapshot_dir: Option<PathBuf>,
    no_snapshots: bool,
    continue_on_failure: bool,
    json: bool,
}

/// Run a pipeline for one topic
async fn run_topic(
    settings: &Settings,
    topic: &str,
    pipeline_name: &str,
    options: RunOptions,
) -> Result<()> {
    let mut pipeline = load_pipeline(settings, pipeline_name)?;
    if options.continue_on_failure {
        pipeline.failure_policy = Some(FailurePolicy::Continue);
    }

    let mut config = OrchestratorConfig::new()
        .failure_policy(settings.failure_policy)
        .observer(LogObserver);

    if !options.no_snapshots {
        if let Some(dir) = options.snapshot_dir {
            config = config.snapshot_dir(dir);
        } else if settings.snapshots {
            config = config.snapshot_dir(settings.cache_dir.clone());
        }
    }

    if settings.journal {
        let journal = RunJournal::open(settings.journal_dir.clone())?;
        config = config.observer_arc(Arc::new(JournalObserver::new(journal)));
    }

    let orchestrator = pipeline
        .orchestrator(config)
        .with_context(|| format!("Pipeline '{}' is invalid", pipeline.name))?;

    let brief = orchestrator.run(topic).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&brief)?);
    } else {
        print_result(&brief);
    }

    if brief.status() != BriefStatus::Completed {
        std::process::exit(1);
    }

    Ok(())
}

fn print_result(brief: &Brief) {
    match brief.status() {
        BriefStatus::Completed => {
            if let Some(output) = brief.final_output() {
                println!("{}", value_text(output));
            }
            eprintln!(
                "\n[Run {} completed: {} steps]",
                brief.run_id(),
                brief.completed().len()
            );
        }
        _ => {
            eprintln!("\n[Run {} failed]", brief.run_id());
            eprintln!("{:<24} {:<12} {}", "STEP", "KIND", "ERROR");
            eprintln!("{}", "-".repeat(75));
            for (step, record) in brief.errors() {
                eprintln!("{:<24} {:<12} {}", step, record.kind, record.message);
            }
            eprintln!(
                "\nCompleted before failure: {}",
                if brief.completed().is_empty() {
                    "(none)".to_string()
                } else {
                    brief.completed().join(", ")
                }
            );
        }
    }
}

/// Validate a pipeline and report the result
fn validate_pipeline(settings: &Settings, name: &str) -> Result<()> {
    let pipeline = load_pipeline(settings, name)?;
    pipeline
        .build()
        .with_context(|| format!("Pipeline '{}' is invalid", pipeline.name))?;

    println!(
        "Pipeline '{}' is valid ({} steps)",
        pipeline.name,
        pipeline.steps.len()
    );
    Ok(())
}

/// Print the execution order of a pipeline
fn show_steps(settings: &Settings, name: &str) -> Result<()> {
    let pipeline = load_pipeline(settings, name)?;
    pipeline
        .validate()
        .with_context(|| format!("Pipeline '{}' is invalid", pipeline.name))?;

    println!("Pipeline: {}", pipeline.name);
    if !pipeline.description.is_empty() {
        println!("{}", pipeline.description);
    }
    println!();
    println!("{:<4} {:<28} {:<10}", "#", "STEP", "KIND");
    println!("{}", "-".repeat(45));

    let terminal = pipeline
        .terminal_step
        .as_deref()
        .or_else(|| pipeline.steps.last().map(|s| s.name.as_str()));

    for (i, step) in pipeline.steps.iter().enumerate() {
        let marker = if Some(step.name.as_str()) == terminal {
            " (final)"
        } else {
            ""
        };
        println!(
            "{:<4} {:<28} {:<10}{}",
            i + 1,
            step.name,
            step.kind.name(),
            marker
        );
    }

    Ok(())
}

/// List snapshots, most recent last
fn show_snapshots(dir: &Path, topic: Option<&str>, limit: usize) -> Result<()> {
    let mut snapshots = list_snapshots(dir)?;

    if let Some(topic) = topic {
        let hash = topic_hash(topic);
        snapshots.retain(|(_, s)| topic_hash(&s.topic) == hash);
    }

    if snapshots.is_empty() {
        println!("No snapshots found in {}", dir.display());
        return Ok(());
    }

    let skip = snapshots.len().saturating_sub(limit);

    println!("{:<28} {:<24} {:<38} {}", "TIMESTAMP", "STEP", "RUN ID", "TOPIC");
    println!("{}", "-".repeat(110));

    for (_, snapshot) in snapshots.iter().skip(skip) {
        println!(
            "{:<28} {:<24} {:<38} {}",
            snapshot.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            snapshot.step,
            snapshot.run_id,
            snapshot.topic
        );
    }

    Ok(())
}

/// Print one snapshot
fn show_snapshot(path: &Path) -> Result<()> {
    let snapshot = load_snapshot(path)?;
    let brief = &snapshot.brief;

    println!("Run ID:    {}", snapshot.run_id);
    println!("Topic:     {}", snapshot.topic);
    println!("Step:      {} (#{})", snapshot.step, snapshot.sequence + 1);
    println!("Timestamp: {}", snapshot.timestamp);
    println!("Status:    {}", brief.status());
    println!("Completed: {}", brief.completed().join(", "));
    if !brief.failed().is_empty() {
        println!("Failed:    {}", brief.failed().join(", "));
    }
    println!();
    println!("Output:");
    println!("{}", value_text(&snapshot.output));

    Ok(())
}

fn show_config(settings: &Settings) -> Result<()> {
    println!("seoflow configuration");
    println!();
    println!(
        "Config file: {}",
        settings
            .config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", settings.home.display());
    println!("  Snapshots: {}", settings.cache_dir.display());
    println!("  Journals:  {}", settings.journal_dir.display());
    println!("  Pipelines: {}", settings.pipelines_dir.display());
    println!();
    println!("Run defaults:");
    println!("  Failure policy: {:?}", settings.failure_policy);
    println!("  Snapshots:      {}", settings.snapshots);
    println!("  Journal:        {}", settings.journal);

    Ok(())
}

/// Load a pipeline by name or path
fn load_pipeline(settings: &Settings, name: &str) -> Result<Pipeline> {
    let candidates = pipeline_candidates(&settings.pipelines_dir, name);

    for path in &candidates {
        if path.is_file() {
            return Pipeline::from_file(path);
        }
    }

    let looked: Vec<String> = candidates
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect();
    anyhow::bail!(
        "Pipeline '{}' not found. Looked for:\n{}",
        name,
        looked.join("\n")
    )
}

fn pipeline_candidates(pipelines_dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![
        pipelines_dir.join(format!("{}.yaml", name)),
        PathBuf::from(format!("{}.yaml", name)),
        PathBuf::from(name),
    ]
}
