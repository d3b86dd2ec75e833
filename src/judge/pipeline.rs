use crate::config::types::{Language, ResourceLimits};
use crate::safety::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Placeholder replaced by the source file path.
pub const SOURCE: &str = "{source}";
/// Placeholder replaced by the workspace root.
pub const WORKDIR: &str = "{workdir}";
/// Placeholder replaced by the compiled artifact path.
pub const BINARY: &str = "{binary}";
/// Placeholder replaced by the per-run dependency directory.
pub const DEPS: &str = "{deps}";
/// Whole-argument placeholder expanded to one argument per package.
pub const PACKAGES: &str = "{packages}";

/// One step of a pipeline: argv template, deadline and kernel limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub command: Vec<String>,
    pub timeout_ms: u64,
    #[serde(default)]
    pub limits: ResourceLimits,
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

impl PhaseSpec {
    pub fn new(command: &[&str], timeout_ms: u64, limits: ResourceLimits) -> Self {
        Self {
            command: command.iter().map(|s| s.to_string()).collect(),
            timeout_ms,
            limits,
            environment: BTreeMap::new(),
        }
    }

    pub fn with_env(mut self, key: &str, value: &str) -> Self {
        self.environment.insert(key.to_string(), value.to_string());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the argv template against a concrete workspace.
    pub fn resolve_argv(&self, workspace: &Workspace, packages: &[String]) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.command.len() + packages.len());
        for arg in &self.command {
            if arg == PACKAGES {
                argv.extend(packages.iter().cloned());
            } else {
                argv.push(substitute(arg, workspace));
            }
        }
        argv
    }

    pub fn resolve_env(&self, workspace: &Workspace) -> Vec<(String, String)> {
        self.environment
            .iter()
            .map(|(k, v)| (k.clone(), substitute(v, workspace)))
            .collect()
    }
}

fn substitute(template: &str, workspace: &Workspace) -> String {
    if !template.contains('{') {
        return template.to_string();
    }
    template
        .replace(SOURCE, &workspace.source_file().to_string_lossy())
        .replace(BINARY, &workspace.binary_path().to_string_lossy())
        .replace(DEPS, &workspace.deps_dir().to_string_lossy())
        .replace(WORKDIR, &workspace.root().to_string_lossy())
}

/// Compile/run recipe for one language.
///
/// `install` is only present for languages with a package manager; it runs
/// before `compile` when the caller has stored dependencies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LanguagePipeline {
    pub language: Language,
    pub file_name: String,
    #[serde(default)]
    pub compile: Option<PhaseSpec>,
    pub run: PhaseSpec,
    #[serde(default)]
    pub install: Option<PhaseSpec>,
    /// Shown to callers, e.g. a required entry-point class name
    #[serde(default)]
    pub notes: Option<String>,
}

impl LanguagePipeline {
    pub fn supports_packages(&self) -> bool {
        self.install.is_some()
    }

    pub fn is_compiled(&self) -> bool {
        self.compile.is_some()
    }

    /// Every phase declared by this pipeline, in execution order.
    pub fn phases(&self) -> impl Iterator<Item = &PhaseSpec> {
        self.install
            .iter()
            .chain(self.compile.iter())
            .chain(std::iter::once(&self.run))
    }
}
