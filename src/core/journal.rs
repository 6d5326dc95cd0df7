//! Append-only run journal with file-based persistence.
//!
//! Each run gets a `<run_id>.events.jsonl` file holding one `RunEvent` per
//! observer notification, as newline-delimited JSON for easy inspection.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::domain::{ProgressUpdate, RunEvent};

use super::observer::Observer;

const JOURNAL_SUFFIX: &str = ".events.jsonl";

/// Directory of per-run JSONL journals
#[derive(Debug, Clone)]
pub struct RunJournal {
    dir: PathBuf,
}

impl RunJournal {
    /// Open (and create if needed) a journal directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create journal directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path to the journal of a run
    pub fn path_for(&self, run_id: Uuid) -> PathBuf {
        self.dir.join(format!("{}{}", run_id, JOURNAL_SUFFIX))
    }

    /// Append an event to its run's journal
    pub fn append(&self, event: &RunEvent) -> Result<()> {
        let path = self.path_for(event.run_id);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open journal file: {}", path.display()))?;

        let json = serde_json::to_string(event).context("Failed to serialize event")?;
        file.write_all(format!("{}\n", json).as_bytes())
            .context("Failed to write event")?;
        file.flush().context("Failed to flush event")?;

        Ok(())
    }

    /// Replay all events of a run in order
    pub fn replay(&self, run_id: Uuid) -> Result<Vec<RunEvent>> {
        let path = self.path_for(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)
            .with_context(|| format!("Failed to open journal file: {}", path.display()))?;

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("Failed to read journal line")?;
            if line.trim().is_empty() {
                continue;
            }
            let event: RunEvent = serde_json::from_str(&line)
                .with_context(|| format!("Failed to parse event: {}", line))?;
            events.push(event);
        }

        Ok(events)
    }

    /// List run IDs that have a journal
    pub fn list_runs(&self) -> Result<Vec<Uuid>> {
        let mut runs = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stem) = name.strip_suffix(JOURNAL_SUFFIX) {
                    if let Ok(uuid) = Uuid::parse_str(stem) {
                        runs.push(uuid);
                    }
                }
            }
        }

        Ok(runs)
    }
}

/// Records every notification in a `RunJournal`
pub struct JournalObserver {
    journal: RunJournal,
}

impl JournalObserver {
    pub fn new(journal: RunJournal) -> Self {
        Self { journal }
    }
}

impl Observer for JournalObserver {
    fn notify(&self, update: &ProgressUpdate<'_>) -> Result<()> {
        self.journal.append(&RunEvent::from_update(update))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Brief, ProgressKind};
    use tempfile::TempDir;

    fn notify(observer: &JournalObserver, brief: &Brief, kind: ProgressKind, step: Option<&str>) {
        let update = ProgressUpdate {
            kind,
            progress: 0.0,
            message: "event".to_string(),
            step,
            brief,
        };
        observer.notify(&update).unwrap();
    }

    #[test]
    fn test_journal_append_and_replay() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path().join("journal")).unwrap();
        let observer = JournalObserver::new(journal.clone());

        let mut brief = Brief::new("topic").unwrap();
        brief.start().unwrap();

        notify(&observer, &brief, ProgressKind::PipelineStarted, None);
        for i in 0..3 {
            let step = format!("step{}", i);
            notify(
                &observer,
                &brief,
                ProgressKind::StepStarted { index: i, total: 3 },
                Some(&step),
            );
        }

        let events = journal.replay(brief.run_id()).unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].kind, ProgressKind::PipelineStarted);
        for (i, event) in events.iter().skip(1).enumerate() {
            assert_eq!(event.step, Some(format!("step{}", i)));
        }
    }

    #[test]
    fn test_list_runs() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path()).unwrap();
        let observer = JournalObserver::new(journal.clone());

        let first = Brief::new("one").unwrap();
        let second = Brief::new("two").unwrap();
        notify(&observer, &first, ProgressKind::PipelineStarted, None);
        notify(&observer, &second, ProgressKind::PipelineStarted, None);
        std::fs::write(temp.path().join("notes.txt"), "ignored").unwrap();

        let mut runs = journal.list_runs().unwrap();
        runs.sort();
        let mut expected = vec![first.run_id(), second.run_id()];
        expected.sort();
        assert_eq!(runs, expected);
    }

    #[test]
    fn test_replay_missing_run_is_empty() {
        let temp = TempDir::new().unwrap();
        let journal = RunJournal::open(temp.path()).unwrap();
        assert!(journal.replay(Uuid::new_v4()).unwrap().is_empty());
    }
}
