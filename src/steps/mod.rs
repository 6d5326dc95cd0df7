//! Built-in step implementations.
//!
//! The set of step kinds is closed: a pipeline file can only name the kinds
//! listed in `StepKind`, and anything else is rejected when the file is
//! parsed. Each kind resolves to one implementation of the `Step` trait.

pub mod assemble;
pub mod command;
pub mod template;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::{ConstructionError, Step};

pub use assemble::{AssembleField, AssembleSpec, AssembleStep};
pub use command::{extract_json, CommandInput, CommandSpec, CommandStep, InputSource};
pub use template::{TemplateSpec, TemplateStep};

/// Registry of step kinds available to pipeline files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// External program (LLM CLI, script)
    Command(CommandSpec),

    /// Text rendered from the topic and earlier outputs
    Template(TemplateSpec),

    /// JSON document merged from earlier outputs
    Assemble(AssembleSpec),
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Template(_) => "template",
            Self::Assemble(_) => "assemble",
        }
    }

    /// Build the implementation for a step called `step`
    pub fn instantiate(&self, step: &str) -> Result<Arc<dyn Step>, ConstructionError> {
        let unresolvable = |reason: String| ConstructionError::Unresolvable {
            step: step.to_string(),
            reason,
        };

        match self {
            Self::Command(spec) => {
                if spec.program.trim().is_empty() {
                    return Err(unresolvable("command has an empty program".to_string()));
                }
                Ok(Arc::new(CommandStep::from_spec(spec)))
            }
            Self::Template(spec) => {
                let parsed = TemplateStep::parse(&spec.template).map_err(unresolvable)?;
                Ok(Arc::new(parsed))
            }
            Self::Assemble(spec) => {
                if spec.fields.is_empty() && spec.topic_field.is_none() {
                    return Err(unresolvable("assemble step has no fields".to_string()));
                }
                for field in &spec.fields {
                    if let Some(ref pointer) = field.pointer {
                        if !pointer.is_empty() && !pointer.starts_with('/') {
                            return Err(unresolvable(format!(
                                "field '{}' has invalid JSON pointer '{}' (must start with '/')",
                                field.name, pointer
                            )));
                        }
                    }
                }
                Ok(Arc::new(AssembleStep::new(spec.clone())))
            }
        }
    }

    /// Names of the steps whose outputs this one reads
    pub fn references(&self) -> Result<Vec<String>, String> {
        let refs = match self {
            Self::Command(spec) => CommandStep::from_spec(spec)
                .references()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Self::Template(spec) => TemplateStep::parse(&spec.template)?
                .references()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Self::Assemble(spec) => AssembleStep::new(spec.clone())
                .references()
                .into_iter()
                .map(str::to_string)
                .collect(),
        };
        Ok(refs)
    }
}
