//! Step failures.
//!
//! A step either produces an output value or a `StepFailure`. The failure is a
//! distinct type rather than a magic key inside the output, so a legitimate
//! output can never be mistaken for an error.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a step failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The step returned an explicit failure
    Reported,

    /// The step panicked while running
    Panicked,

    /// The step exceeded its deadline
    TimedOut,

    /// The step could not perform I/O (spawn, pipes, files)
    Io,

    /// The step task was cancelled before it finished
    Aborted,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Reported => "reported",
            Self::Panicked => "panicked",
            Self::TimedOut => "timed_out",
            Self::Io => "io",
            Self::Aborted => "aborted",
        };
        f.pad(s)
    }
}

/// Failure half of a step result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Human-readable reason
    pub message: String,

    /// Category of the failure
    pub kind: FailureKind,
}

impl StepFailure {
    /// An explicit failure reported by the step itself
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Reported, message)
    }

    pub fn with_kind(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
        }
    }

    pub fn panicked(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Panicked, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::TimedOut, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::with_kind(FailureKind::Io, message)
    }

    /// Failure for a dependency whose output is not in the brief
    pub fn missing_output(step: &str) -> Self {
        Self::new(format!("No output available from step '{}'", step))
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepFailure {}

/// Error detail stored on the brief for a failed step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepErrorRecord {
    /// Name of the step that failed
    pub step: String,

    /// Message provided by the step
    pub message: String,

    /// Category of the failure
    pub kind: FailureKind,

    /// When the failure was recorded
    pub occurred_at: DateTime<Utc>,

    /// How long the step ran before failing
    pub duration_ms: Option<u64>,
}

impl StepErrorRecord {
    pub fn new(step: impl Into<String>, failure: &StepFailure) -> Self {
        Self {
            step: step.into(),
            message: failure.message.clone(),
            kind: failure.kind,
            occurred_at: Utc::now(),
            duration_ms: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }
}
