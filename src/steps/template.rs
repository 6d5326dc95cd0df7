//! Template step: renders text from the topic and earlier outputs.
//!
//! Placeholders: `{{topic}}`, `{{steps.<name>}}` and
//! `{{steps.<name>.<field>...}}` for nested JSON fields.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{Step, StepResult};
use crate::domain::{value_text, BriefView, StepFailure};

/// YAML definition of a template step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Topic,
    Output { step: String, path: Vec<String> },
}

/// Step that renders a parsed template
#[derive(Debug, Clone)]
pub struct TemplateStep {
    segments: Vec<Segment>,
}

impl TemplateStep {
    /// Parse a template; unknown placeholders and unclosed braces are errors
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut rest = template;

        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after
                .find("}}")
                .ok_or_else(|| format!("Unclosed placeholder at '{}'", &rest[open..]))?;
            segments.push(parse_placeholder(after[..close].trim())?);
            rest = &after[close + 2..];
        }

        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    /// Steps whose outputs the template reads
    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Output { step, .. } = segment {
                if !refs.contains(&step.as_str()) {
                    refs.push(step);
                }
            }
        }
        refs
    }

    pub fn render(&self, brief: &BriefView) -> Result<String, StepFailure> {
        let mut out = String::new();

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Topic => out.push_str(brief.topic()),
                Segment::Output { step, path } => {
                    let mut value = brief.require(step)?;
                    for field in path {
                        value = lookup(value, field).ok_or_else(|| {
                            StepFailure::new(format!(
                                "Output of step '{}' has no field '{}'",
                                step, field
                            ))
                        })?;
                    }
                    out.push_str(&value_text(value));
                }
            }
        }

        Ok(out)
    }
}

#[async_trait]
impl Step for TemplateStep {
    async fn run(&self, brief: &BriefView) -> StepResult {
        Ok(Value::String(self.render(brief)?))
    }
}

fn parse_placeholder(expr: &str) -> Result<Segment, String> {
    if expr == "topic" {
        return Ok(Segment::Topic);
    }

    let mut parts = expr.split('.');
    match (parts.next(), parts.next()) {
        (Some("steps"), Some(step)) if !step.is_empty() => {
            let path: Vec<String> = parts.map(str::to_string).collect();
            if path.iter().any(|p| p.is_empty()) {
                return Err(format!("Empty field in placeholder '{{{{{}}}}}'", expr));
            }
            Ok(Segment::Output {
                step: step.to_string(),
                path,
            })
        }
        _ => Err(format!("Unknown placeholder '{{{{{}}}}}'", expr)),
    }
}

/// Object field or array index
fn lookup<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(field),
        Value::Array(items) => field.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}
