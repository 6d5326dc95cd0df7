//! Snapshots: point-in-time copies of a brief written after each step.
//!
//! Snapshots form an audit trail for inspection tooling. The orchestrator
//! writes them and never reads them back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::brief::Brief;

/// Serialized record of a brief after a step completed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub run_id: Uuid,

    pub topic: String,

    /// Step that just completed
    pub step: String,

    /// Zero-based position of the step in the pipeline
    pub sequence: usize,

    pub timestamp: DateTime<Utc>,

    /// Output of the step
    pub output: Value,

    /// Full brief after the output was merged
    pub brief: Brief,
}

impl Snapshot {
    /// Capture a brief right after `step` completed
    pub fn capture(brief: &Brief, step: &str, sequence: usize) -> Self {
        Self {
            run_id: brief.run_id(),
            topic: brief.topic().to_string(),
            step: step.to_string(),
            sequence,
            timestamp: Utc::now(),
            output: brief.output(step).cloned().unwrap_or(Value::Null),
            brief: brief.clone(),
        }
    }
}
