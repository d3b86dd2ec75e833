/// Engine configuration loaded from a JSON file
use crate::config::presets::builtin_pipelines;
use crate::config::types::{Language, Result, SandboxError};
use crate::exec::runner::DEFAULT_SEARCH_PATH;
use crate::judge::pipeline::LanguagePipeline;
use crate::utils::output::OutputLimits;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level engine settings.
///
/// Every field has a default, so an empty JSON object is a valid config.
/// `languages` entries replace the built-in pipeline for that language;
/// languages not mentioned keep their built-in recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parent directory for per-run workspaces
    pub workspace_root: PathBuf,
    /// Directory holding the ledger and dependency files
    pub state_dir: PathBuf,
    pub max_concurrent_runs: usize,
    pub stdout_cap: usize,
    pub stderr_cap: usize,
    /// Workspaces older than this are removed at startup
    pub stale_workspace_secs: u64,
    /// PATH given to every child process
    pub search_path: String,
    pub languages: BTreeMap<Language, LanguagePipeline>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let base = std::env::temp_dir().join("snipbox");
        Self {
            workspace_root: base.join("work"),
            state_dir: base.join("state"),
            max_concurrent_runs: 5,
            stdout_cap: 10_000,
            stderr_cap: 8_000,
            stale_workspace_secs: 3600,
            search_path: DEFAULT_SEARCH_PATH.to_string(),
            languages: BTreeMap::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            SandboxError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| SandboxError::Config(format!("Failed to parse config JSON: {}", e)))
    }

    /// Built-in pipelines with configured overrides applied.
    pub fn effective_pipelines(&self) -> BTreeMap<Language, LanguagePipeline> {
        let mut table = builtin_pipelines();
        for (language, pipeline) in &self.languages {
            let mut pipeline = pipeline.clone();
            pipeline.language = *language;
            table.insert(*language, pipeline);
        }
        table
    }

    pub fn output_limits(&self) -> OutputLimits {
        OutputLimits {
            stdout_limit: self.stdout_cap,
            stderr_limit: self.stderr_cap,
        }
    }

    pub fn stale_workspace_age(&self) -> Duration {
        Duration::from_secs(self.stale_workspace_secs)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("ledger.jsonl")
    }

    pub fn dependencies_path(&self) -> PathBuf {
        self.state_dir.join("dependencies.json")
    }
}
