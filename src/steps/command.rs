//! Command step: runs an external program (e.g. an LLM CLI such as `fabric`).
//!
//! The selected input is written to the program's stdin and stdout becomes the
//! step output. The child is killed if the step future is dropped, so a
//! `Timeout` wrapper bounds it.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::core::{Step, StepResult};
use crate::domain::{value_text, BriefView, StepFailure};

/// What a command receives on stdin
///
/// Supports multiple YAML formats:
/// - `input: topic`
/// - `input: brief` (JSON of the read-only view)
/// - `input: { step: step_name }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CommandInput {
    Source(InputSource),

    /// Output of an earlier step
    Step { step: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputSource {
    Topic,
    Brief,
}

impl Default for CommandInput {
    fn default() -> Self {
        Self::Source(InputSource::Topic)
    }
}

/// YAML definition of a command step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default)]
    pub input: CommandInput,

    /// Parse stdout as JSON instead of keeping it as text
    #[serde(default)]
    pub parse_json: bool,
}

/// Step that pipes its input through a subprocess
#[derive(Debug, Clone)]
pub struct CommandStep {
    program: String,
    args: Vec<String>,
    input: CommandInput,
    parse_json: bool,
}

impl CommandStep {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            input: CommandInput::default(),
            parse_json: false,
        }
    }

    pub fn from_spec(spec: &CommandSpec) -> Self {
        Self {
            program: spec.program.clone(),
            args: spec.args.clone(),
            input: spec.input.clone(),
            parse_json: spec.parse_json,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn input(mut self, input: CommandInput) -> Self {
        self.input = input;
        self
    }

    pub fn parse_json(mut self, parse_json: bool) -> Self {
        self.parse_json = parse_json;
        self
    }

    fn render_input(&self, brief: &BriefView) -> Result<String, StepFailure> {
        match &self.input {
            CommandInput::Source(InputSource::Topic) => Ok(brief.topic().to_string()),
            CommandInput::Source(InputSource::Brief) => serde_json::to_string_pretty(brief)
                .map_err(|e| StepFailure::new(format!("Failed to serialize brief: {}", e))),
            CommandInput::Step { step } => Ok(value_text(brief.require(step)?)),
        }
    }

    async fn execute(&self, input: &str) -> Result<String, StepFailure> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| StepFailure::io(format!("Failed to spawn '{}': {}", self.program, e)))?;

        // Feed stdin while stdout is drained, or a large input fills both pipes
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(input.as_bytes()).await {
                    // The child may exit without reading all of its input
                    Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => return Err(e),
                    _ => {}
                }
                // Dropping stdin signals EOF
            }
            Ok(())
        };

        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed.map_err(|e| {
            StepFailure::io(format!("Failed to write to '{}' stdin: {}", self.program, e))
        })?;
        let output = output.map_err(|e| {
            StepFailure::io(format!("Failed to wait for '{}': {}", self.program, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let exit_code = output.status.code().unwrap_or(-1);
            return Err(StepFailure::new(format!(
                "'{}' failed with exit code {}: {}",
                self.program,
                exit_code,
                stderr.trim()
            )));
        }

        String::from_utf8(output.stdout).map_err(|_| {
            StepFailure::new(format!("Output of '{}' is not valid UTF-8", self.program))
        })
    }

    /// Steps this command reads from
    pub fn references(&self) -> Vec<&str> {
        match &self.input {
            CommandInput::Step { step } => vec![step.as_str()],
            CommandInput::Source(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Step for CommandStep {
    async fn run(&self, brief: &BriefView) -> StepResult {
        let input = self.render_input(brief)?;
        let stdout = self.execute(&input).await?;

        if self.parse_json {
            return extract_json(&stdout).ok_or_else(|| {
                StepFailure::new(format!("Output of '{}' is not valid JSON", self.program))
            });
        }

        Ok(Value::String(stdout.trim_end().to_string()))
    }
}

/// Pull a JSON value out of model output.
///
/// Tries a fenced ```json block, then the outermost `{...}`, then the whole text.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(start) = text.find("```json") {
        let body = &text[start + "```json".len()..];
        let end = body.find("```").unwrap_or(body.len());
        if let Ok(value) = serde_json::from_str(body[..end].trim()) {
            return Some(value);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value) = serde_json::from_str(&text[start..=end]) {
                return Some(value);
            }
        }
    }

    serde_json::from_str(text.trim()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailureKind;
    use serde_json::json;

    #[test]
    fn test_extract_fenced_json() {
        let text = "Here you go:\n```json\n{\"title\": \"Solar\"}\n```\nEnjoy";
        assert_eq!(extract_json(text), Some(json!({"title": "Solar"})));
    }

    #[test]
    fn test_extract_braced_json() {
        let text = "Sure! {\"keywords\": [\"solar\", \"wind\"]} hope that helps";
        assert_eq!(extract_json(text), Some(json!({"keywords": ["solar", "wind"]})));
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        assert_eq!(extract_json("no structured data here"), None);
    }

    #[test]
    fn test_input_spec_parsing() {
        let topic: CommandInput = serde_yaml::from_str("topic").unwrap();
        let brief: CommandInput = serde_yaml::from_str("brief").unwrap();
        let step: CommandInput = serde_yaml::from_str("step: outline").unwrap();

        assert_eq!(topic, CommandInput::Source(InputSource::Topic));
        assert_eq!(brief, CommandInput::Source(InputSource::Brief));
        assert_eq!(
            step,
            CommandInput::Step {
                step: "outline".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_dependency_is_failure() {
        let step = CommandStep::new("cat").input(CommandInput::Step {
            step: "outline".to_string(),
        });

        let failure = step.run(&BriefView::for_topic("t")).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Reported);
        assert!(failure.message.contains("outline"));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_failure() {
        let step = CommandStep::new("definitely-not-a-real-program-7f3a");
        let failure = step.run(&BriefView::for_topic("t")).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Io);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cat_echoes_topic() {
        let step = CommandStep::new("cat");
        let output = step.run(&BriefView::for_topic("Solar panels")).await.unwrap();
        assert_eq!(output, json!("Solar panels"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cat_parses_json_from_step() {
        let view = BriefView::for_topic("t").with_output("draft", json!("{\"words\": 1200}"));
        let step = CommandStep::new("cat")
            .input(CommandInput::Step {
                step: "draft".to_string(),
            })
            .parse_json(true);

        assert_eq!(step.run(&view).await.unwrap(), json!({"words": 1200}));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_input_does_not_block() {
        let draft = "x".repeat(256 * 1024);
        let view = BriefView::for_topic("t").with_output("draft", json!(draft.clone()));
        let step = CommandStep::new("cat").input(CommandInput::Step {
            step: "draft".to_string(),
        });

        let output = tokio::time::timeout(std::time::Duration::from_secs(10), step.run(&view))
            .await
            .expect("command step blocked on a large input")
            .unwrap();
        assert_eq!(output, json!(draft));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let step = CommandStep::new("sh").args(["-c", "echo quota exceeded >&2; exit 3"]);
        let failure = step.run(&BriefView::for_topic("t")).await.unwrap_err();
        assert!(failure.message.contains("exit code 3"));
        assert!(failure.message.contains("quota exceeded"));
    }
}
