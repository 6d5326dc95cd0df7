//! Assemble step: collects earlier outputs into one JSON document.
//!
//! Used as the final step of an article pipeline to merge draft, SEO
//! metadata, schema markup and so on into a publishable result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{Step, StepResult};
use crate::domain::{BriefView, StepFailure};

/// One field of the assembled document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleField {
    /// Key in the output object
    pub name: String,

    /// Step to read from
    pub from: String,

    /// JSON pointer into that step's output (e.g. `/draft/body`)
    #[serde(default)]
    pub pointer: Option<String>,

    /// Fail when the value is absent; optional fields are omitted instead
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

/// YAML definition of an assemble step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssembleSpec {
    pub fields: Vec<AssembleField>,

    /// Also include the topic under this key
    #[serde(default)]
    pub topic_field: Option<String>,
}

/// Step that merges named outputs into an object
#[derive(Debug, Clone)]
pub struct AssembleStep {
    spec: AssembleSpec,
}

impl AssembleStep {
    pub fn new(spec: AssembleSpec) -> Self {
        Self { spec }
    }

    pub fn references(&self) -> Vec<&str> {
        let mut refs: Vec<&str> = Vec::new();
        for field in &self.spec.fields {
            if !refs.contains(&field.from.as_str()) {
                refs.push(&field.from);
            }
        }
        refs
    }

    fn resolve<'a>(&self, brief: &'a BriefView, field: &AssembleField) -> Option<&'a Value> {
        let output = brief.output(&field.from)?;
        match field.pointer.as_deref() {
            Some(pointer) => output.pointer(pointer),
            None => Some(output),
        }
    }
}

#[async_trait]
impl Step for AssembleStep {
    async fn run(&self, brief: &BriefView) -> StepResult {
        let mut document = Map::new();
        let mut missing = Vec::new();

        if let Some(ref key) = self.spec.topic_field {
            document.insert(key.clone(), Value::String(brief.topic().to_string()));
        }

        for field in &self.spec.fields {
            match self.resolve(brief, field) {
                Some(value) => {
                    document.insert(field.name.clone(), value.clone());
                }
                None if field.required => missing.push(field.name.as_str()),
                None => {}
            }
        }

        if !missing.is_empty() {
            return Err(StepFailure::new(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        Ok(Value::Object(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, from: &str, pointer: Option<&str>, required: bool) -> AssembleField {
        AssembleField {
            name: name.to_string(),
            from: from.to_string(),
            pointer: pointer.map(str::to_string),
            required,
        }
    }

    fn view() -> BriefView {
        BriefView::for_topic("Heat pumps")
            .with_output(
                "draft_writer",
                json!({"draft": {"title": "Heat pumps 101", "body": "..."}}),
            )
            .with_output("onpage_seo", json!({"meta_description": "All about heat pumps"}))
    }

    #[tokio::test]
    async fn test_assemble_with_pointers() {
        let step = AssembleStep::new(AssembleSpec {
            fields: vec![
                field("title", "draft_writer", Some("/draft/title"), true),
                field("seo", "onpage_seo", None, true),
                field("schema", "schema_enhancement", None, false),
            ],
            topic_field: Some("topic".to_string()),
        });

        let output = step.run(&view()).await.unwrap();
        assert_eq!(
            output,
            json!({
                "topic": "Heat pumps",
                "title": "Heat pumps 101",
                "seo": {"meta_description": "All about heat pumps"}
            })
        );
    }

    #[tokio::test]
    async fn test_missing_required_field_fails() {
        let step = AssembleStep::new(AssembleSpec {
            fields: vec![
                field("title", "draft_writer", Some("/draft/missing"), true),
                field("images", "image_optimization", None, true),
            ],
            topic_field: None,
        });

        let failure = step.run(&view()).await.unwrap_err();
        assert_eq!(failure.message, "Missing required fields: title, images");
    }

    #[test]
    fn test_references_deduplicated() {
        let step = AssembleStep::new(AssembleSpec {
            fields: vec![
                field("a", "draft_writer", None, true),
                field("b", "draft_writer", Some("/x"), true),
                field("c", "onpage_seo", None, false),
            ],
            topic_field: None,
        });
        assert_eq!(step.references(), ["draft_writer", "onpage_seo"]);
    }
}
