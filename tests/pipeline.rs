//! Pipeline Integration Tests
//!
//! Tests for the shipped pipeline files, YAML-driven runs and the run journal.

use std::path::PathBuf;
use std::sync::Arc;

use seoflow::core::{
    FailurePolicy, JournalObserver, OrchestratorConfig, Pipeline, RunJournal,
};
use seoflow::domain::{BriefStatus, ProgressKind};
use serde_json::json;
use tempfile::TempDir;

fn shipped(name: &str) -> Pipeline {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("pipelines")
        .join(format!("{}.yaml", name));
    Pipeline::from_file(&path).unwrap()
}

#[test]
fn test_seo_article_pipeline_order() {
    let pipeline = shipped("seo_article");
    pipeline.validate().unwrap();

    let names: Vec<&str> = pipeline.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "user_input",
            "trend_idea",
            "intent_classifier",
            "competitor_scan",
            "keyword_mining",
            "outline_generator",
            "draft_writer",
            "humanization",
            "readability",
            "tone_check",
            "style_consistency",
            "qa_validation",
            "keyword_enrichment",
            "internal_linking",
            "external_link_vetting",
            "onpage_seo",
            "technical_seo",
            "schema_enhancement",
            "image_optimization",
            "alt_text",
            "final_assembly",
        ]
    );
    assert_eq!(pipeline.terminal_step.as_deref(), Some("final_assembly"));
    assert_eq!(pipeline.build().unwrap().len(), 21);
}

#[tokio::test]
async fn test_demo_pipeline_runs_offline() {
    let pipeline = shipped("demo");
    let orchestrator = pipeline.orchestrator(OrchestratorConfig::default()).unwrap();

    let brief = orchestrator.run("composting").await.unwrap();

    assert_eq!(brief.status(), BriefStatus::Completed);
    assert_eq!(brief.completed().len(), pipeline.steps.len());

    let output = brief.final_output().unwrap();
    assert_eq!(output["topic"], json!("composting"));
    assert_eq!(
        output["meta_description"],
        json!("Learn the essentials of composting in one short guide.")
    );
    assert!(output["article"]
        .as_str()
        .unwrap()
        .contains("1. What is composting?"));
}

#[tokio::test]
async fn test_yaml_failure_policy_and_terminal_step() {
    let yaml = r#"
name: partial
terminal_step: intro
failure_policy: continue
steps:
  - name: intro
    kind: template
    template: "About {{topic}}"
  - name: broken
    kind: template
    template: "{{steps.intro.title}}"
  - name: outro
    kind: template
    template: "Thanks for reading about {{topic}}"
"#;
    let pipeline = Pipeline::from_yaml(yaml).unwrap();
    let orchestrator = pipeline.orchestrator(OrchestratorConfig::default()).unwrap();
    assert_eq!(orchestrator.failure_policy(), FailurePolicy::Continue);

    let brief = orchestrator.run("bees").await.unwrap();

    assert_eq!(brief.status(), BriefStatus::Failed);
    assert_eq!(brief.completed(), ["intro", "outro"]);
    assert_eq!(brief.failed(), ["broken"]);
    assert!(brief.error("broken").unwrap().message.contains("title"));
}

#[cfg(unix)]
#[tokio::test]
async fn test_command_steps_chain() {
    let yaml = r#"
name: shell
steps:
  - name: shout
    kind: command
    program: tr
    args: ["a-z", "A-Z"]
  - name: wrap
    kind: command
    program: sh
    args: ["-c", "printf '{\"headline\": \"%s\"}' \"$(cat)\""]
    input:
      step: shout
    parse_json: true
"#;
    let pipeline = Pipeline::from_yaml(yaml).unwrap();
    let orchestrator = pipeline.orchestrator(OrchestratorConfig::default()).unwrap();

    let brief = orchestrator.run("solar roofs").await.unwrap();
    assert_eq!(brief.status(), BriefStatus::Completed);
    assert_eq!(brief.output("shout"), Some(&json!("SOLAR ROOFS")));
    assert_eq!(brief.final_output(), Some(&json!({"headline": "SOLAR ROOFS"})));
}

#[tokio::test]
async fn test_journal_records_every_notification() {
    let temp = TempDir::new().unwrap();
    let journal = RunJournal::open(temp.path().join("runs")).unwrap();
    let reader = RunJournal::open(temp.path().join("runs")).unwrap();

    let pipeline = shipped("demo");
    let config = OrchestratorConfig::new()
        .observer_arc(Arc::new(JournalObserver::new(journal)));
    let orchestrator = pipeline.orchestrator(config).unwrap();

    let brief = orchestrator.run("composting").await.unwrap();
    let events = reader.replay(brief.run_id()).unwrap();

    assert_eq!(events.len(), 2 + 2 * pipeline.steps.len());
    assert_eq!(events[0].kind, ProgressKind::PipelineStarted);
    assert_eq!(events.last().unwrap().kind, ProgressKind::PipelineCompleted);
    assert_eq!(events.last().unwrap().status, BriefStatus::Completed);
    assert!(events.iter().all(|e| e.run_id == brief.run_id()));

    assert_eq!(reader.list_runs().unwrap(), vec![brief.run_id()]);
}
