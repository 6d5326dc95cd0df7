//! The brief: the shared document threaded through a pipeline run.
//!
//! Only the orchestrator mutates a brief. Steps get a `BriefView`, a read-only
//! copy of the topic and the outputs accumulated so far.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::failure::{StepErrorRecord, StepFailure};

/// Lifecycle status of a brief
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BriefStatus {
    /// Created, no step has run yet
    #[default]
    Initialized,

    /// Steps are executing
    Running,

    /// Every step succeeded
    Completed,

    /// At least one step failed
    Failed,
}

impl BriefStatus {
    /// Completed and failed briefs are sealed
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Status only moves forward: initialized -> running -> completed|failed
    pub fn can_transition_to(self, next: BriefStatus) -> bool {
        matches!(
            (self, next),
            (Self::Initialized, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for BriefStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Violations of the brief lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BriefError {
    #[error("Topic must be a non-empty string")]
    EmptyTopic,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: BriefStatus, to: BriefStatus },

    #[error("Brief is {status} and can no longer be modified")]
    Sealed { status: BriefStatus },

    #[error("Brief has not been started")]
    NotStarted,

    #[error("Step '{0}' has already been recorded")]
    StepAlreadyRecorded(String),
}

/// Shared state of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Brief {
    run_id: Uuid,
    topic: String,
    status: BriefStatus,
    current_step: Option<String>,
    outputs: IndexMap<String, Value>,
    completed: Vec<String>,
    failed: Vec<String>,
    errors: IndexMap<String, StepErrorRecord>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    final_output: Option<Value>,
}

impl Brief {
    /// Create a brief for a topic. Rejects empty or whitespace-only topics.
    pub fn new(topic: impl Into<String>) -> Result<Self, BriefError> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(BriefError::EmptyTopic);
        }

        Ok(Self {
            run_id: Uuid::new_v4(),
            topic,
            status: BriefStatus::Initialized,
            current_step: None,
            outputs: IndexMap::new(),
            completed: Vec::new(),
            failed: Vec::new(),
            errors: IndexMap::new(),
            start_time: Some(Utc::now()),
            end_time: None,
            final_output: None,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn status(&self) -> BriefStatus {
        self.status
    }

    /// Step currently executing (cleared once the brief is sealed)
    pub fn current_step(&self) -> Option<&str> {
        self.current_step.as_deref()
    }

    /// Outputs keyed by step name, in execution order
    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    pub fn output(&self, step: &str) -> Option<&Value> {
        self.outputs.get(step)
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    pub fn errors(&self) -> &IndexMap<String, StepErrorRecord> {
        &self.errors
    }

    pub fn error(&self, step: &str) -> Option<&StepErrorRecord> {
        self.errors.get(step)
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn end_time(&self) -> Option<DateTime<Utc>> {
        self.end_time
    }

    pub fn final_output(&self) -> Option<&Value> {
        self.final_output.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration of the run, once it has ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }

    /// Read-only copy handed to steps
    pub fn view(&self) -> BriefView {
        BriefView {
            run_id: self.run_id,
            topic: self.topic.clone(),
            outputs: self.outputs.clone(),
            completed: self.completed.clone(),
        }
    }

    /// initialized -> running
    pub fn start(&mut self) -> Result<(), BriefError> {
        self.transition(BriefStatus::Running)
    }

    /// Mark a step as the one currently executing
    pub fn begin_step(&mut self, step: &str) -> Result<(), BriefError> {
        self.ensure_running()?;
        self.current_step = Some(step.to_string());
        Ok(())
    }

    /// Store a step's output and mark it completed
    pub fn record_success(&mut self, step: &str, output: Value) -> Result<(), BriefError> {
        self.ensure_running()?;
        self.ensure_unrecorded(step)?;

        self.outputs.insert(step.to_string(), output);
        self.completed.push(step.to_string());
        Ok(())
    }

    /// Mark a step failed and keep its error detail
    pub fn record_failure(&mut self, record: StepErrorRecord) -> Result<(), BriefError> {
        self.ensure_running()?;
        self.ensure_unrecorded(&record.step)?;

        self.failed.push(record.step.clone());
        self.errors.insert(record.step.clone(), record);
        Ok(())
    }

    /// running -> completed, with the designated terminal result
    pub fn complete(&mut self, final_output: Value) -> Result<(), BriefError> {
        self.transition(BriefStatus::Completed)?;
        self.final_output = Some(final_output);
        self.seal();
        Ok(())
    }

    /// running -> failed; `final_output` stays unset
    pub fn fail(&mut self) -> Result<(), BriefError> {
        self.transition(BriefStatus::Failed)?;
        self.seal();
        Ok(())
    }

    fn transition(&mut self, next: BriefStatus) -> Result<(), BriefError> {
        if self.status.is_terminal() {
            return Err(BriefError::Sealed {
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(BriefError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    fn seal(&mut self) {
        let now = Utc::now();
        // Wall clocks can step backwards; keep start <= end.
        let end = match self.start_time {
            Some(start) if start > now => start,
            _ => now,
        };
        self.end_time = Some(end);
        self.current_step = None;
    }

    fn ensure_running(&self) -> Result<(), BriefError> {
        match self.status {
            BriefStatus::Running => Ok(()),
            BriefStatus::Initialized => Err(BriefError::NotStarted),
            status => Err(BriefError::Sealed { status }),
        }
    }

    fn ensure_unrecorded(&self, step: &str) -> Result<(), BriefError> {
        let seen = self.completed.iter().chain(self.failed.iter()).any(|s| s == step);
        if seen {
            return Err(BriefError::StepAlreadyRecorded(step.to_string()));
        }
        Ok(())
    }
}

/// Read-only view of a brief, as seen by a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BriefView {
    run_id: Uuid,
    topic: String,
    outputs: IndexMap<String, Value>,
    completed: Vec<String>,
}

impl BriefView {
    /// A view with no prior outputs, useful when exercising a step directly
    pub fn for_topic(topic: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::nil(),
            topic: topic.into(),
            outputs: IndexMap::new(),
            completed: Vec::new(),
        }
    }

    /// Add a completed step output to a detached view
    pub fn with_output(mut self, step: impl Into<String>, output: Value) -> Self {
        let step = step.into();
        self.completed.push(step.clone());
        self.outputs.insert(step, output);
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn outputs(&self) -> &IndexMap<String, Value> {
        &self.outputs
    }

    pub fn output(&self, step: &str) -> Option<&Value> {
        self.outputs.get(step)
    }

    pub fn completed(&self) -> &[String] {
        &self.completed
    }

    /// Output of a dependency, or an explicit failure when it is absent
    pub fn require(&self, step: &str) -> Result<&Value, StepFailure> {
        self.outputs
            .get(step)
            .ok_or_else(|| StepFailure::missing_output(step))
    }
}

/// Text form of an output value: strings as-is, anything else as pretty JSON
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}
