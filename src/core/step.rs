//! The step contract.
//!
//! A step is one named unit of pipeline work. It reads a `BriefView` and
//! returns either an output value, stored under the step's name, or a
//! `StepFailure`. Steps hold no state between invocations that the
//! orchestrator relies on.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::{BriefView, StepFailure};

/// Result of one step invocation
pub type StepResult = Result<Value, StepFailure>;

/// A unit of pipeline work
#[async_trait]
pub trait Step: Send + Sync {
    /// Produce this step's output from the accumulated brief
    async fn run(&self, brief: &BriefView) -> StepResult;
}

/// Static configuration of one pipeline position: a unique name and its implementation
#[derive(Clone)]
pub struct StepDescriptor {
    name: String,
    step: Arc<dyn Step>,
}

impl StepDescriptor {
    pub fn new(name: impl Into<String>, step: impl Step + 'static) -> Self {
        Self::from_arc(name, Arc::new(step))
    }

    pub fn from_arc(name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        Self {
            name: name.into(),
            step,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared handle to the implementation
    pub fn step(&self) -> Arc<dyn Step> {
        Arc::clone(&self.step)
    }
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
