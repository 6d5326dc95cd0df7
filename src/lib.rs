//! seoflow - sequential SEO article pipeline orchestrator
//!
//! Runs an ordered list of named steps over a shared brief for one topic.
//! Each step reads a snapshot of what earlier steps produced and returns one
//! JSON value, which the orchestrator merges into the brief under the step's
//! name.
//!
//! # Architecture
//!
//! - Steps run strictly one at a time, in order
//! - A failing step is recorded on the brief; by default the run stops there
//! - After every successful step the whole brief is snapshotted to disk
//! - Observers receive progress updates and can never break a run
//!
//! # Modules
//!
//! - `domain`: Data structures (Brief, StepFailure, ProgressUpdate, Snapshot)
//! - `core`: Orchestration logic (Orchestrator, Pipeline, observers, stores)
//! - `steps`: Built-in step kinds (command, template, assemble)
//! - `config`: Settings resolution
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Run the article pipeline for a topic
//! seoflow run "heat pumps for older homes"
//!
//! # Check a pipeline file without running it
//! seoflow validate demo
//!
//! # Browse snapshots written by earlier runs
//! seoflow snapshots --topic "heat pumps for older homes"
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod steps;

// Re-export main types at crate root for convenience
pub use core::{
    FailurePolicy, Observer, Orchestrator, OrchestratorConfig, Pipeline, Step, StepDescriptor,
    StepResult,
};
pub use domain::{Brief, BriefError, BriefStatus, BriefView, ProgressUpdate, StepFailure};
