//! Snapshot persistence.
//!
//! One JSON file per completed step, named from topic, step and timestamp.
//! Files are written to a temp file in the target directory and renamed into
//! place, so readers never see a partial snapshot. Existing files are never
//! overwritten.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::domain::{Brief, Snapshot};

const MAX_SLUG_LEN: usize = 48;
const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6fZ";

/// Writes snapshots into a directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open (and create if needed) a snapshot directory
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Snapshot the brief after `step` completed; returns the written path
    pub fn write(&self, brief: &Brief, step: &str, sequence: usize) -> Result<PathBuf> {
        let snapshot = Snapshot::capture(brief, step, sequence);
        let json =
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize snapshot")?;

        let mut temp = NamedTempFile::new_in(&self.dir).with_context(|| {
            format!("Failed to create temporary file in: {}", self.dir.display())
        })?;
        temp.write_all(json.as_bytes())
            .context("Failed to write snapshot to temporary file")?;
        temp.as_file()
            .sync_all()
            .context("Failed to fsync snapshot")?;

        let base = file_stem(&snapshot.topic, step, snapshot.timestamp);
        let mut suffix = 0u32;

        loop {
            let name = if suffix == 0 {
                format!("{}.json", base)
            } else {
                format!("{}-{}.json", base, suffix)
            };
            let target = self.dir.join(name);

            match temp.persist_noclobber(&target) {
                Ok(_) => {
                    debug!(path = %target.display(), "Snapshot written");
                    return Ok(target);
                }
                Err(e) if e.error.kind() == std::io::ErrorKind::AlreadyExists => {
                    temp = e.file;
                    suffix += 1;
                }
                Err(e) => {
                    return Err(e.error).with_context(|| {
                        format!("Failed to persist snapshot: {}", target.display())
                    });
                }
            }
        }
    }
}

/// Load one snapshot file
pub fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))
}

/// All snapshots in a directory, oldest first. Unreadable files are skipped.
pub fn list_snapshots(dir: &Path) -> Result<Vec<(PathBuf, Snapshot)>> {
    let mut snapshots = Vec::new();

    if !dir.exists() {
        return Ok(snapshots);
    }

    for entry in fs::read_dir(dir)
        .with_context(|| format!("Failed to read snapshot directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match load_snapshot(&path) {
            Ok(snapshot) => snapshots.push((path, snapshot)),
            Err(e) => debug!(error = %e, "Skipping unreadable snapshot"),
        }
    }

    snapshots.sort_by(|a, b| {
        a.1.timestamp
            .cmp(&b.1.timestamp)
            .then(a.1.sequence.cmp(&b.1.sequence))
    });
    Ok(snapshots)
}

/// `{slug}_{hash8}_{step}_{timestamp}` without extension
pub fn file_stem(topic: &str, step: &str, timestamp: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}_{}",
        topic_slug(topic),
        topic_hash(topic),
        sanitize(step),
        timestamp.format(TIMESTAMP_FORMAT)
    )
}

/// Filesystem-safe, length-capped rendering of a topic
pub fn topic_slug(topic: &str) -> String {
    let slug: String = sanitize(topic.trim()).chars().take(MAX_SLUG_LEN).collect();
    if slug.is_empty() {
        "topic".to_string()
    } else {
        slug
    }
}

/// First 8 hex chars of SHA-256(topic); distinguishes topics sharing a slug
pub fn topic_hash(topic: &str) -> String {
    let digest = Sha256::digest(topic.as_bytes());
    hex::encode(&digest[..4])
}

fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn brief_with(step: &str) -> Brief {
        let mut brief = Brief::new("The Future of Renewable Energy").unwrap();
        brief.start().unwrap();
        brief.record_success(step, json!({"ideas": 3})).unwrap();
        brief
    }

    #[test]
    fn test_topic_slug() {
        assert_eq!(topic_slug("AI Ethics"), "AI_Ethics");
        assert_eq!(topic_slug("../etc/passwd"), "___etc_passwd");
        assert_eq!(topic_slug("   "), "topic");
        assert_eq!(topic_slug(&"x".repeat(200)).len(), MAX_SLUG_LEN);
    }

    #[test]
    fn test_topic_hash() {
        assert_eq!(topic_hash("a"), topic_hash("a"));
        assert_ne!(topic_hash("AI ethics"), topic_hash("AI_ethics"));
        assert_eq!(topic_hash("a").len(), 8);
    }

    #[test]
    fn test_file_stem_is_deterministic() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 5).unwrap();
        let stem = file_stem("AI Ethics", "trend_idea", ts);

        assert!(stem.starts_with("AI_Ethics_"));
        assert!(stem.ends_with("_trend_idea_20260301T123005.000000Z"));
        assert_eq!(stem, file_stem("AI Ethics", "trend_idea", ts));
    }

    #[test]
    fn test_write_and_load() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp.path().join("cache")).unwrap();
        let brief = brief_with("trend_idea");

        let path = store.write(&brief, "trend_idea", 0).unwrap();
        let snapshot = load_snapshot(&path).unwrap();

        assert_eq!(snapshot.topic, brief.topic());
        assert_eq!(snapshot.step, "trend_idea");
        assert_eq!(snapshot.output, json!({"ideas": 3}));
        assert_eq!(snapshot.run_id, brief.run_id());
    }

    #[test]
    fn test_repeated_writes_never_overwrite() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        let brief = brief_with("outline");

        let paths: Vec<PathBuf> = (0..5)
            .map(|_| store.write(&brief, "outline", 0).unwrap())
            .collect();

        let mut unique = paths.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), 5);
        assert_eq!(list_snapshots(temp.path()).unwrap().len(), 5);
    }

    #[test]
    fn test_list_skips_foreign_files() {
        let temp = TempDir::new().unwrap();
        let store = SnapshotStore::open(temp.path()).unwrap();
        store.write(&brief_with("a"), "a", 0).unwrap();
        fs::write(temp.path().join("broken.json"), "{not json").unwrap();
        fs::write(temp.path().join("readme.txt"), "hi").unwrap();

        let listed = list_snapshots(temp.path()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1.step, "a");
    }

    #[test]
    fn test_list_missing_directory() {
        let temp = TempDir::new().unwrap();
        assert!(list_snapshots(&temp.path().join("nope")).unwrap().is_empty());
    }
}
