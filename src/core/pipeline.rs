//! Pipeline definitions and loading.
//!
//! Pipelines are defined in YAML and consist of ordered steps, each naming
//! one of the built-in step kinds. A pipeline is validated as a whole before
//! it is turned into an orchestrator, so a bad file never starts a run.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::steps::StepKind;

use super::error::ConstructionError;
use super::layers::{Retry, RetryPolicy, Timeout};
use super::orchestrator::{FailurePolicy, Orchestrator, OrchestratorConfig};
use super::step::{Step, StepDescriptor};

/// A complete pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline name (used in CLI)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Step whose output becomes the final output (defaults to the last step)
    #[serde(default)]
    pub terminal_step: Option<String>,

    /// Overrides the configured failure policy when set
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,

    /// Deadline applied to steps without their own `timeout_seconds`
    #[serde(default)]
    pub step_timeout_seconds: Option<u64>,

    /// Ordered list of steps to execute
    pub steps: Vec<StepDefinition>,
}

impl Pipeline {
    /// Load a pipeline from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        Self::from_yaml(&content)
            .with_context(|| format!("Invalid pipeline file: {}", path.display()))
    }

    /// Parse a pipeline from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse pipeline YAML")
    }

    /// Validate the pipeline definition
    pub fn validate(&self) -> Result<(), ConstructionError> {
        if self.name.trim().is_empty() {
            return Err(ConstructionError::EmptyPipelineName);
        }

        if self.steps.is_empty() {
            return Err(ConstructionError::NoSteps);
        }

        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (i, step) in self.steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(ConstructionError::EmptyStepName { index: i });
            }
            if positions.insert(step.name.as_str(), i).is_some() {
                return Err(ConstructionError::DuplicateStep(step.name.clone()));
            }
        }

        if let Some(ref terminal) = self.terminal_step {
            if !positions.contains_key(terminal.as_str()) {
                return Err(ConstructionError::UnknownTerminalStep(terminal.clone()));
            }
        }

        // Steps may only read outputs of steps that run before them
        for (i, step) in self.steps.iter().enumerate() {
            let references = step
                .kind
                .references()
                .map_err(|reason| ConstructionError::Unresolvable {
                    step: step.name.clone(),
                    reason,
                })?;

            for reference in references {
                match positions.get(reference.as_str()) {
                    Some(&idx) if idx >= i => {
                        return Err(ConstructionError::ForwardReference {
                            step: step.name.clone(),
                            reference,
                        });
                    }
                    None => {
                        return Err(ConstructionError::UnknownReference {
                            step: step.name.clone(),
                            reference,
                        });
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Get a step by name
    pub fn get_step(&self, name: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// Get the index of a step by name
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    /// Validate and instantiate every step, wrapped in its timeout and retry layers
    pub fn build(&self) -> Result<Vec<StepDescriptor>, ConstructionError> {
        self.validate()?;

        self.steps
            .iter()
            .map(|definition| {
                let step = definition.instantiate(self.step_timeout_seconds)?;
                Ok(StepDescriptor::from_arc(definition.name.clone(), step))
            })
            .collect()
    }

    /// Build an orchestrator, applying this pipeline's terminal step and failure policy
    pub fn orchestrator(
        &self,
        mut config: OrchestratorConfig,
    ) -> Result<Orchestrator, ConstructionError> {
        let steps = self.build()?;

        if config.terminal_step.is_none() {
            config.terminal_step = self.terminal_step.clone();
        }
        if let Some(policy) = self.failure_policy {
            config.failure_policy = policy;
        }

        Orchestrator::new(steps, config)
    }
}

/// A single step in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step name (unique within pipeline)
    pub name: String,

    /// What the step does
    #[serde(flatten)]
    pub kind: StepKind,

    /// Override the pipeline's step timeout
    #[serde(default)]
    pub timeout_seconds: Option<u64>,

    /// Retry the step on failure; no retries when absent
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

impl StepDefinition {
    /// Effective timeout for this step, if any
    pub fn timeout(&self, default_seconds: Option<u64>) -> Option<Duration> {
        self.timeout_seconds
            .or(default_seconds)
            .map(Duration::from_secs)
    }

    fn instantiate(
        &self,
        default_timeout: Option<u64>,
    ) -> Result<Arc<dyn Step>, ConstructionError> {
        let mut step = self.kind.instantiate(&self.name)?;

        if let Some(limit) = self.timeout(default_timeout) {
            step = Arc::new(Timeout::new(step, limit));
        }
        if let Some(ref policy) = self.retry {
            if policy.max_attempts == 0 {
                return Err(ConstructionError::Unresolvable {
                    step: self.name.clone(),
                    reason: "retry.max_attempts must be at least 1".to_string(),
                });
            }
            step = Arc::new(Retry::new(step, policy.clone()).labeled(self.name.clone()));
        }

        Ok(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_PIPELINE_YAML: &str = r#"
name: test
description: Test pipeline
step_timeout_seconds: 60

steps:
  - name: first
    kind: template
    template: "Outline for {{topic}}"

  - name: second
    kind: command
    program: cat
    input:
      step: first
    timeout_seconds: 5
    retry:
      max_attempts: 2

  - name: third
    kind: assemble
    fields:
      - name: outline
        from: first
      - name: body
        from: second
"#;

    #[test]
    fn test_pipeline_parsing() {
        let pipeline = Pipeline::from_yaml(TEST_PIPELINE_YAML).unwrap();

        assert_eq!(pipeline.name, "test");
        assert_eq!(pipeline.steps.len(), 3);
        assert_eq!(pipeline.step_index("second"), Some(1));

        let second = pipeline.get_step("second").unwrap();
        assert_eq!(second.kind.name(), "command");
        assert_eq!(second.timeout(pipeline.step_timeout_seconds), Some(Duration::from_secs(5)));
        assert_eq!(second.retry.as_ref().map(|r| r.max_attempts), Some(2));

        let first = pipeline.get_step("first").unwrap();
        assert_eq!(first.timeout(pipeline.step_timeout_seconds), Some(Duration::from_secs(60)));
        assert!(first.retry.is_none());
    }

    #[test]
    fn test_pipeline_validation() {
        let pipeline = Pipeline::from_yaml(TEST_PIPELINE_YAML).unwrap();
        assert!(pipeline.validate().is_ok());
        assert_eq!(pipeline.build().unwrap().len(), 3);
    }

    #[test]
    fn test_invalid_step_reference() {
        let yaml = r#"
name: invalid
steps:
  - name: first
    kind: template
    template: "{{steps.nonexistent}}"
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(matches!(
            pipeline.validate(),
            Err(ConstructionError::UnknownReference { ref reference, .. })
                if reference == "nonexistent"
        ));
    }

    #[test]
    fn test_forward_reference() {
        let yaml = r#"
name: forward
steps:
  - name: first
    kind: command
    program: cat
    input:
      step: second
  - name: second
    kind: template
    template: "{{topic}}"
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(matches!(
            pipeline.validate(),
            Err(ConstructionError::ForwardReference { .. })
        ));
    }

    #[test]
    fn test_self_reference_is_forward() {
        let yaml = r#"
name: loop
steps:
  - name: only
    kind: template
    template: "{{steps.only}}"
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(matches!(
            pipeline.validate(),
            Err(ConstructionError::ForwardReference { .. })
        ));
    }

    #[test]
    fn test_duplicate_and_terminal_checks() {
        let duplicate = Pipeline::from_yaml(
            r#"
name: dup
steps:
  - { name: a, kind: template, template: x }
  - { name: a, kind: template, template: y }
"#,
        )
        .unwrap();
        assert!(matches!(
            duplicate.validate(),
            Err(ConstructionError::DuplicateStep(_))
        ));

        let terminal = Pipeline::from_yaml(
            r#"
name: term
terminal_step: publish
steps:
  - { name: a, kind: template, template: x }
"#,
        )
        .unwrap();
        assert!(matches!(
            terminal.validate(),
            Err(ConstructionError::UnknownTerminalStep(_))
        ));
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let pipeline = Pipeline::from_yaml("name: empty\nsteps: []").unwrap();
        assert!(matches!(pipeline.validate(), Err(ConstructionError::NoSteps)));

        let unnamed = Pipeline::from_yaml("name: ''\nsteps: []").unwrap();
        assert!(matches!(
            unnamed.validate(),
            Err(ConstructionError::EmptyPipelineName)
        ));
    }

    #[test]
    fn test_unknown_kind_fails_to_parse() {
        let yaml = r#"
name: bad
steps:
  - name: first
    kind: python
    module: agents.trend
"#;
        assert!(Pipeline::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_zero_attempts_rejected() {
        let yaml = r#"
name: retry
steps:
  - name: first
    kind: template
    template: x
    retry:
      max_attempts: 0
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        assert!(matches!(
            pipeline.build(),
            Err(ConstructionError::Unresolvable { .. })
        ));
    }

    #[test]
    fn test_orchestrator_uses_pipeline_settings() {
        let yaml = r#"
name: settings
terminal_step: a
failure_policy: continue
steps:
  - { name: a, kind: template, template: x }
  - { name: b, kind: template, template: y }
"#;
        let pipeline = Pipeline::from_yaml(yaml).unwrap();
        let orchestrator = pipeline.orchestrator(OrchestratorConfig::default()).unwrap();
        assert_eq!(orchestrator.failure_policy(), FailurePolicy::Continue);
        assert_eq!(orchestrator.step_names(), ["a", "b"]);
    }
}
