//! Progress notifications delivered to observers.

use serde::{Deserialize, Serialize};

use super::brief::Brief;

/// What happened at a step boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProgressKind {
    PipelineStarted,

    StepStarted { index: usize, total: usize },

    StepCompleted { index: usize, total: usize },

    StepFailed {
        index: usize,
        total: usize,
        error: String,
    },

    PipelineCompleted,

    PipelineFailed,
}

impl ProgressKind {
    pub fn is_step_start(&self) -> bool {
        matches!(self, Self::StepStarted { .. })
    }

    /// A step finished, successfully or not
    pub fn is_step_end(&self) -> bool {
        matches!(self, Self::StepCompleted { .. } | Self::StepFailed { .. })
    }

    /// Last notification of a run
    pub fn is_final(&self) -> bool {
        matches!(self, Self::PipelineCompleted | Self::PipelineFailed)
    }
}

/// A single observer notification
#[derive(Debug, Clone)]
pub struct ProgressUpdate<'a> {
    pub kind: ProgressKind,

    /// Fraction of the pipeline done, in [0, 1]
    pub progress: f64,

    /// Human-readable status line
    pub message: String,

    /// Step the notification refers to, if any
    pub step: Option<&'a str>,

    /// State of the brief at the time of the notification
    pub brief: &'a Brief,
}

impl ProgressUpdate<'_> {
    /// Progress as a whole percentage
    pub fn percent(&self) -> u8 {
        (self.progress.clamp(0.0, 1.0) * 100.0).round() as u8
    }
}

/// Progress fraction for `done` of `total` steps
pub fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done.min(total) as f64) / (total as f64)
}
