//! Core orchestration logic.
//!
//! This module contains:
//! - Step: the async step trait and named descriptors
//! - Orchestrator: sequential execution engine
//! - Pipeline: YAML pipeline definitions and loading
//! - Observer: progress notification plumbing
//! - SnapshotStore / RunJournal: on-disk run history

pub mod error;
pub mod journal;
pub mod layers;
pub mod observer;
pub mod orchestrator;
pub mod pipeline;
pub mod snapshot_store;
pub mod step;

// Re-export commonly used types
pub use error::ConstructionError;
pub use journal::{JournalObserver, RunJournal};
pub use layers::{is_timeout, Retry, RetryPolicy, Timeout};
pub use observer::{
    from_fn, notify_isolated, FnObserver, LogObserver, Observer, ObserverChain, OnStepCompleted,
};
pub use orchestrator::{FailurePolicy, Orchestrator, OrchestratorConfig};
pub use pipeline::{Pipeline, StepDefinition};
pub use snapshot_store::{list_snapshots, load_snapshot, SnapshotStore};
pub use step::{Step, StepDescriptor, StepResult};
