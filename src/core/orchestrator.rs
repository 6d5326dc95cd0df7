//! Main orchestrator for pipeline execution.
//!
//! Runs a fixed, ordered list of steps one at a time, merges each output into
//! the brief, snapshots the brief after every successful step and reports
//! progress to observers. A step failure ends the run (unless the caller opted
//! into `FailurePolicy::Continue`); it is recorded on the returned brief and
//! never surfaces as an `Err`.

use std::any::Any;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::domain::{
    fraction, Brief, BriefError, BriefView, FailureKind, ProgressKind, ProgressUpdate,
    StepErrorRecord, StepFailure,
};

use super::error::ConstructionError;
use super::observer::{notify_isolated, Observer, ObserverChain};
use super::snapshot_store::SnapshotStore;
use super::step::{StepDescriptor, StepResult};

/// What to do when a step fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure
    #[default]
    Abort,

    /// Record the failure and keep running later steps; the run still ends failed
    Continue,
}

/// Explicit orchestrator configuration
#[derive(Clone, Default)]
pub struct OrchestratorConfig {
    /// Where snapshots go; `None` disables snapshots
    pub snapshot_dir: Option<PathBuf>,

    pub failure_policy: FailurePolicy,

    /// Step whose output becomes `final_output` (defaults to the last step)
    pub terminal_step: Option<String>,

    pub observers: ObserverChain,
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn terminal_step(mut self, step: impl Into<String>) -> Self {
        self.terminal_step = Some(step.into());
        self
    }

    pub fn observer(mut self, observer: impl Observer + 'static) -> Self {
        self.observers.push(Arc::new(observer));
        self
    }

    pub fn observer_arc(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observers.push(observer);
        self
    }
}

/// Main pipeline orchestrator
pub struct Orchestrator {
    steps: Vec<StepDescriptor>,
    failure_policy: FailurePolicy,
    terminal_step: Option<String>,
    snapshots: Option<SnapshotStore>,
    observers: ObserverChain,
}

impl Orchestrator {
    /// Validate the step list and configuration, and prepare the snapshot directory
    pub fn new(
        steps: Vec<StepDescriptor>,
        config: OrchestratorConfig,
    ) -> Result<Self, ConstructionError> {
        if steps.is_empty() {
            return Err(ConstructionError::NoSteps);
        }

        let mut seen = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            if step.name().trim().is_empty() {
                return Err(ConstructionError::EmptyStepName { index });
            }
            if !seen.insert(step.name()) {
                return Err(ConstructionError::DuplicateStep(step.name().to_string()));
            }
        }

        if let Some(ref terminal) = config.terminal_step {
            if !seen.contains(terminal.as_str()) {
                return Err(ConstructionError::UnknownTerminalStep(terminal.clone()));
            }
        }

        let snapshots = match config.snapshot_dir {
            Some(dir) => Some(
                SnapshotStore::open(&dir)
                    .map_err(|source| ConstructionError::SnapshotDir { path: dir, source })?,
            ),
            None => None,
        };

        Ok(Self {
            steps,
            failure_policy: config.failure_policy,
            terminal_step: config.terminal_step,
            snapshots,
            observers: config.observers,
        })
    }

    /// Step names in execution order
    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn failure_policy(&self) -> FailurePolicy {
        self.failure_policy
    }

    pub fn snapshot_store(&self) -> Option<&SnapshotStore> {
        self.snapshots.as_ref()
    }

    /// Execute every step for `topic` and return the sealed brief.
    ///
    /// Only an empty topic is an error; step failures are reported through
    /// the brief's status, `failed` list and error map.
    #[instrument(skip(self), fields(steps = self.steps.len()))]
    pub async fn run(&self, topic: &str) -> Result<Brief, BriefError> {
        let mut brief = Brief::new(topic)?;
        brief.start()?;

        let total = self.steps.len();
        let started = Instant::now();
        let mut progress = 0.0;

        info!(run_id = %brief.run_id(), topic = %brief.topic(), "Pipeline started");
        self.emit(
            &brief,
            ProgressKind::PipelineStarted,
            progress,
            format!("Starting pipeline for '{}'", brief.topic()),
            None,
        );

        for (index, descriptor) in self.steps.iter().enumerate() {
            let name = descriptor.name();
            brief.begin_step(name)?;

            progress = fraction(index, total);
            debug!(step = %name, index, total, "Step starting");
            self.emit(
                &brief,
                ProgressKind::StepStarted { index, total },
                progress,
                format!("Running {} ({}/{})", name, index + 1, total),
                Some(name),
            );

            let step_start = Instant::now();
            let result = invoke(descriptor, brief.view()).await;
            let duration_ms = step_start.elapsed().as_millis() as u64;

            match result {
                Ok(output) => {
                    brief.record_success(name, output)?;
                    self.write_snapshot(&brief, name, index);

                    info!(step = %name, duration_ms, "Step completed");
                    progress = fraction(index + 1, total);
                    self.emit(
                        &brief,
                        ProgressKind::StepCompleted { index, total },
                        progress,
                        format!("Completed {}", name),
                        Some(name),
                    );
                }
                Err(failure) => {
                    error!(
                        step = %name,
                        duration_ms,
                        kind = %failure.kind,
                        error = %failure.message,
                        "Step failed"
                    );
                    brief.record_failure(
                        StepErrorRecord::new(name, &failure).with_duration(duration_ms),
                    )?;
                    self.emit(
                        &brief,
                        ProgressKind::StepFailed {
                            index,
                            total,
                            error: failure.message.clone(),
                        },
                        progress,
                        format!("Step '{}' failed: {}", name, failure.message),
                        Some(name),
                    );

                    if self.failure_policy == FailurePolicy::Abort {
                        break;
                    }
                }
            }
        }

        self.finish(brief, progress, started.elapsed().as_millis() as u64)
    }

    /// Seal the brief as completed or failed and send the final notification
    fn finish(
        &self,
        mut brief: Brief,
        progress: f64,
        elapsed_ms: u64,
    ) -> Result<Brief, BriefError> {
        let final_output = if brief.failed().is_empty() {
            self.final_step_name()
                .and_then(|name| brief.output(name))
                .cloned()
        } else {
            None
        };

        match final_output {
            Some(output) => {
                brief.complete(output)?;
                info!(
                    run_id = %brief.run_id(),
                    elapsed_ms,
                    "Pipeline completed successfully"
                );
                self.emit(
                    &brief,
                    ProgressKind::PipelineCompleted,
                    1.0,
                    "Pipeline complete".to_string(),
                    None,
                );
            }
            None => {
                brief.fail()?;
                warn!(
                    run_id = %brief.run_id(),
                    elapsed_ms,
                    failed = ?brief.failed(),
                    "Pipeline failed"
                );
                let message = format!("Pipeline failed at: {}", brief.failed().join(", "));
                self.emit(&brief, ProgressKind::PipelineFailed, progress, message, None);
            }
        }

        Ok(brief)
    }

    fn final_step_name(&self) -> Option<&str> {
        self.terminal_step
            .as_deref()
            .or_else(|| self.steps.last().map(|s| s.name()))
    }

    fn write_snapshot(&self, brief: &Brief, step: &str, sequence: usize) {
        if let Some(ref store) = self.snapshots {
            if let Err(e) = store.write(brief, step, sequence) {
                warn!(step = %step, error = %e, "Failed to write snapshot");
            }
        }
    }

    fn emit(
        &self,
        brief: &Brief,
        kind: ProgressKind,
        progress: f64,
        message: String,
        step: Option<&str>,
    ) {
        if self.observers.is_empty() {
            return;
        }
        let update = ProgressUpdate {
            kind,
            progress,
            message,
            step,
            brief,
        };
        notify_isolated(&self.observers, &update);
    }
}

/// Aborts the step task when the run future is dropped mid-step
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run one step on its own task so a panic becomes a failure
async fn invoke(descriptor: &StepDescriptor, view: BriefView) -> StepResult {
    let step = descriptor.step();
    let mut task = AbortOnDrop(tokio::spawn(async move { step.run(&view).await }));

    match (&mut task.0).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(StepFailure::panicked(format!(
            "Step panicked: {}",
            panic_message(e.into_panic())
        ))),
        Err(e) => Err(StepFailure::with_kind(
            FailureKind::Aborted,
            format!("Step task was cancelled: {}", e),
        )),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
