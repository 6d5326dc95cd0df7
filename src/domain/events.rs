//! Journal events.
//!
//! Every observer notification can be recorded as an immutable event in an
//! append-only per-run journal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::brief::BriefStatus;
use super::progress::{ProgressKind, ProgressUpdate};

/// A single entry in a run journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Unique identifier for this event
    pub id: Uuid,

    /// When this event occurred (ISO 8601)
    pub timestamp: DateTime<Utc>,

    /// The run this event belongs to
    pub run_id: Uuid,

    /// Topic of the run
    pub topic: String,

    /// Step the event refers to (if applicable)
    pub step: Option<String>,

    /// What happened
    #[serde(flatten)]
    pub kind: ProgressKind,

    /// Progress fraction at the time of the event
    pub progress: f64,

    /// Human-readable summary
    pub message: String,

    /// Brief status at the time of the event
    pub status: BriefStatus,

    /// Number of steps completed so far
    pub completed: usize,
}

impl RunEvent {
    /// Capture a progress notification as a journal entry
    pub fn from_update(update: &ProgressUpdate<'_>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            run_id: update.brief.run_id(),
            topic: update.brief.topic().to_string(),
            step: update.step.map(str::to_string),
            kind: update.kind.clone(),
            progress: update.progress,
            message: update.message.clone(),
            status: update.brief.status(),
            completed: update.brief.completed().len(),
        }
    }

    /// Error message carried by a step failure event
    pub fn error(&self) -> Option<&str> {
        match &self.kind {
            ProgressKind::StepFailed { error, .. } => Some(error),
            _ => None,
        }
    }
}
