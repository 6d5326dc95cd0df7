//! Errors raised while building an orchestrator.

use std::path::PathBuf;

use thiserror::Error;

/// A pipeline that cannot be run. Raised at construction, before any step executes.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("Pipeline name cannot be empty")]
    EmptyPipelineName,

    #[error("Pipeline must have at least one step")]
    NoSteps,

    #[error("Step {index} has an empty name")]
    EmptyStepName { index: usize },

    #[error("Duplicate step name '{0}'")]
    DuplicateStep(String),

    #[error("Terminal step '{0}' is not part of the pipeline")]
    UnknownTerminalStep(String),

    #[error("Step '{step}' references non-existent step '{reference}'")]
    UnknownReference { step: String, reference: String },

    #[error("Step '{step}' references future step '{reference}' (forward references not allowed)")]
    ForwardReference { step: String, reference: String },

    #[error("Step '{step}' cannot be resolved: {reason}")]
    Unresolvable { step: String, reason: String },

    #[error("Failed to prepare snapshot directory {}: {source}", path.display())]
    SnapshotDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
