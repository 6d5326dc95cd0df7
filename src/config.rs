//! Configuration for seoflow paths and run defaults.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (SEOFLOW_HOME, SEOFLOW_CACHE_DIR, SEOFLOW_PIPELINES)
//! 2. Config file (.seoflow/config.yaml)
//! 3. Defaults (~/.seoflow, <home>/cache, ./pipelines)
//!
//! Config file discovery:
//! - Searches current directory and parents for .seoflow/config.yaml
//! - Paths in config file are relative to the project root (the parent of .seoflow/)

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::FailurePolicy;

pub const ENV_HOME: &str = "SEOFLOW_HOME";
pub const ENV_CACHE_DIR: &str = "SEOFLOW_CACHE_DIR";
pub const ENV_PIPELINES: &str = "SEOFLOW_PIPELINES";

const CONFIG_DIR: &str = ".seoflow";
const CONFIG_FILE: &str = "config.yaml";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub run: RunConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Engine state directory (run journals)
    pub home: Option<String>,
    /// Snapshot directory
    pub cache: Option<String>,
    /// Directory searched for pipeline files
    pub pipelines: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunConfig {
    pub failure_policy: Option<FailurePolicy>,
    /// Write a snapshot after every successful step
    pub snapshots: Option<bool>,
    /// Keep a JSONL event journal per run
    pub journal: Option<bool>,
}

/// Resolved settings with absolute paths
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// seoflow home (engine state)
    pub home: PathBuf,
    /// Where brief snapshots are written
    pub cache_dir: PathBuf,
    /// Where run journals are written ($SEOFLOW_HOME/runs)
    pub journal_dir: PathBuf,
    /// Where named pipelines are looked up
    pub pipelines_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    pub failure_policy: FailurePolicy,
    pub snapshots: bool,
    pub journal: bool,
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join(CONFIG_FILE);
        if config_path.is_file() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    // An empty file is a valid (all defaults) config
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to `base`
pub fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Merge environment, config file and defaults.
///
/// `env` looks up a variable by name; tests pass a closure instead of
/// touching the process environment.
pub fn resolve_settings<E>(
    file: Option<(&Path, &ConfigFile)>,
    env: E,
    default_home: PathBuf,
) -> Settings
where
    E: Fn(&str) -> Option<String>,
{
    let base_dir = file
        .and_then(|(path, _)| path.parent()) // .seoflow/
        .and_then(|p| p.parent()) // project root
        .map(Path::to_path_buf);

    let from_file = |pick: fn(&PathsConfig) -> Option<&String>| -> Option<PathBuf> {
        let (_, config) = file?;
        let value = pick(&config.paths)?;
        let base = base_dir.as_deref().unwrap_or(Path::new("."));
        Some(resolve_path(base, value))
    };

    let home = env(ENV_HOME)
        .map(PathBuf::from)
        .or_else(|| from_file(|p| p.home.as_ref()))
        .unwrap_or(default_home);

    let cache_dir = env(ENV_CACHE_DIR)
        .map(PathBuf::from)
        .or_else(|| from_file(|p| p.cache.as_ref()))
        .unwrap_or_else(|| home.join("cache"));

    let pipelines_dir = env(ENV_PIPELINES)
        .map(PathBuf::from)
        .or_else(|| from_file(|p| p.pipelines.as_ref()))
        .unwrap_or_else(|| PathBuf::from("pipelines"));

    let run = file.map(|(_, c)| c.run.clone()).unwrap_or_default();

    Settings {
        journal_dir: home.join("runs"),
        home,
        cache_dir,
        pipelines_dir,
        config_file: file.map(|(path, _)| path.to_path_buf()),
        failure_policy: run.failure_policy.unwrap_or_default(),
        snapshots: run.snapshots.unwrap_or(true),
        journal: run.journal.unwrap_or(true),
    }
}

/// Load settings from the process environment, the nearest config file and defaults
pub fn load_settings() -> Result<Settings> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".seoflow");

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let config_path = find_config_file(&cwd);
    let config = match config_path {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    let file = config_path.as_deref().zip(config.as_ref());
    Ok(resolve_settings(
        file,
        |key| std::env::var(key).ok(),
        default_home,
    ))
}
