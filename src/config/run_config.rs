use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, LevelFilter};
use serde::Deserialize;

use crate::config::source_tree::SourceTree;

/// Raw shape of the YAML sources definition file.
#[derive(Debug, Deserialize)]
struct SourcesFileRaw {
    root: PathBuf,
    #[serde(default)]
    environment: BTreeMap<String, String>,
    sources: serde_yaml::Value,
}

/// Parsed and validated sources definition file.
#[derive(Debug, Clone)]
pub struct SourcesConfig {
    /// Directory under which the source hierarchy is mirrored.
    pub root: PathBuf,
    /// Extra variables overlaid on the process environment for every
    /// command invocation.
    pub environment: BTreeMap<String, String>,
    /// The validated source tree.
    pub tree: SourceTree,
}

impl SourcesConfig {
    /// Load a sources definition from a YAML file.
    ///
    /// Tree-shape validation happens here, before any command execution.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .context(format!("Failed to read sources file: {}", path.display()))?;

        let raw: SourcesFileRaw = serde_yaml::from_str(&content)
            .context("Failed to parse YAML sources file")?;

        let tree = SourceTree::from_value(&raw.sources)
            .context(format!("Invalid sources file {}", path.display()))?;

        debug!("Loaded sources definition from {}", path.display());
        Ok(Self {
            root: raw.root,
            environment: raw.environment,
            tree,
        })
    }
}

/// Per-run immutable state, shared read-only by every source pipeline.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub root: PathBuf,
    pub environment: BTreeMap<String, String>,
    pub log_level: LevelFilter,
    pub max_workers: usize,
    /// Optional per-command timeout; expiry kills the child and fails the
    /// file or source it was working for.
    pub command_timeout: Option<Duration>,
}

impl RunContext {
    pub fn new(config: &SourcesConfig, log_level: LevelFilter, max_workers: usize) -> Self {
        Self {
            root: config.root.clone(),
            environment: config.environment.clone(),
            log_level,
            max_workers: max_workers.max(1),
            command_timeout: None,
        }
    }

    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }
}
