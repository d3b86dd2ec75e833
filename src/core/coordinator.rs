/// Execution coordinator
///
/// `Engine::execute` is the single entry point front ends call. One run:
/// resolve language, take an admission slot, provision a workspace, run the
/// install/compile/run phases, dispose the workspace, append to the ledger.
/// Phases within a run are sequential; runs are concurrent up to the gate
/// size.
use crate::config::engine::EngineConfig;
use crate::config::types::{ExecutionStatus, Language, Phase, Result, RunOutcome, SandboxError};
use crate::config::validator::validate_config;
use crate::core::gate::AdmissionGate;
use crate::core::types::{ExecutionReply, ExecutionRequest};
use crate::exec::runner::{PhaseInvocation, ProcessRunner};
use crate::judge::detect::detect;
use crate::judge::pipeline::{LanguagePipeline, PhaseSpec};
use crate::judge::registry::PipelineTable;
use crate::safety::workspace::{Workspace, WorkspaceManager};
use crate::store::deps::DependencyStore;
use crate::store::ledger::{LedgerEntry, NewLedgerEntry, RunLedger};
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Anything that can turn a request into a reply.
///
/// [`Engine`] runs snippets locally; a remote backend would implement the
/// same trait.
pub trait Executor: Send + Sync {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReply>;

    fn supported_languages(&self) -> Vec<Language>;
}

pub struct Engine {
    pipelines: PipelineTable,
    workspaces: WorkspaceManager,
    runner: ProcessRunner,
    gate: AdmissionGate,
    dependencies: DependencyStore,
    ledger: RunLedger,
}

/// Final outcome of a pipeline plus any install warning.
struct PipelineResult {
    outcome: RunOutcome,
    install_warning: Option<String>,
}

impl Engine {
    /// Validate `config`, sweep stale workspaces and open durable state.
    pub fn new(config: EngineConfig) -> Result<Self> {
        validate_config(&config)?;

        let workspaces = WorkspaceManager::new(config.workspace_root.clone())?;
        match workspaces.sweep_stale(config.stale_workspace_age()) {
            Ok(0) => {}
            Ok(n) => info!("Removed {} stale workspace(s) from {}", n, workspaces.base_dir().display()),
            Err(e) => warn!("Stale workspace sweep failed: {}", e),
        }

        std::fs::create_dir_all(&config.state_dir).map_err(|e| {
            SandboxError::Config(format!(
                "Failed to create state directory {}: {}",
                config.state_dir.display(),
                e
            ))
        })?;

        let dependencies = DependencyStore::open(config.dependencies_path())?;
        let ledger = RunLedger::open(config.ledger_path())?;

        Ok(Self {
            pipelines: PipelineTable::new(config.effective_pipelines()),
            runner: ProcessRunner::new(config.output_limits(), config.search_path.clone()),
            gate: AdmissionGate::new(config.max_concurrent_runs),
            workspaces,
            dependencies,
            ledger,
        })
    }

    /// Run one snippet to completion.
    ///
    /// Compile errors, crashes and timeouts come back as an
    /// [`ExecutionStatus`] inside `Ok`. `Err` means the language was
    /// unsupported or the host failed; neither writes a ledger entry.
    pub fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReply> {
        let language = self.resolve_language(request)?;
        let pipeline = self.pipelines.lookup(language)?;

        let _permit = self.gate.acquire();

        let mut workspace = self.workspaces.provision(pipeline, request.code())?;
        let result = self.run_pipeline(pipeline, &workspace, request);
        if let Err(e) = workspace.dispose() {
            warn!("Failed to dispose workspace {}: {}", workspace.run_id(), e);
        }
        let PipelineResult {
            outcome,
            install_warning,
        } = result?;

        let status = ExecutionStatus::classify(&outcome);
        let stdout = outcome.stdout_lossy();
        let mut stderr = outcome.stderr_lossy();
        if let Some(warning) = install_warning {
            if !stderr.is_empty() && !stderr.ends_with('\n') {
                stderr.push('\n');
            }
            stderr.push_str(&warning);
        }

        let entry = self.ledger.append(NewLedgerEntry {
            caller_id: request.caller_id().to_string(),
            language,
            code: request.code().to_string(),
            stdout: stdout.clone(),
            stderr: stderr.clone(),
            status,
        })?;

        info!(
            "Run {} for {}: {} {} ({} phase, {}ms)",
            entry.id,
            request.caller_id(),
            language,
            status,
            outcome.phase,
            outcome.wall_time_ms
        );

        Ok(ExecutionReply {
            stdout,
            stderr,
            exit_code: outcome.exit_code,
            timed_out: outcome.timed_out,
            language,
            status,
            phase: outcome.phase,
            ledger_id: entry.id,
            stdout_truncated: outcome.stdout_truncated,
            stderr_truncated: outcome.stderr_truncated,
            wall_time_ms: outcome.wall_time_ms,
        })
    }

    fn resolve_language(&self, request: &ExecutionRequest) -> Result<Language> {
        match request.language_hint() {
            Some(hint) if !hint.trim().is_empty() => hint.parse(),
            _ => {
                let language = detect(request.code());
                debug!("No language hint from {}; detected {}", request.caller_id(), language);
                Ok(language)
            }
        }
    }

    fn run_pipeline(
        &self,
        pipeline: &LanguagePipeline,
        workspace: &Workspace,
        request: &ExecutionRequest,
    ) -> Result<PipelineResult> {
        let install_warning = match &pipeline.install {
            Some(install) => self.install_packages(install, workspace, request.caller_id()),
            None => None,
        };

        if let Some(compile) = &pipeline.compile {
            let outcome = self.run_phase(Phase::Compile, compile, workspace, &[], None)?;
            if !outcome.success() {
                return Ok(PipelineResult {
                    outcome,
                    install_warning,
                });
            }
        }

        let stdin = request.stdin().map(str::as_bytes);
        let outcome = self.run_phase(Phase::Run, &pipeline.run, workspace, &[], stdin)?;
        Ok(PipelineResult {
            outcome,
            install_warning,
        })
    }

    /// Install the caller's packages. Failure never aborts the run; it
    /// becomes a warning appended to the run's stderr.
    fn install_packages(
        &self,
        install: &PhaseSpec,
        workspace: &Workspace,
        caller_id: &str,
    ) -> Option<String> {
        let packages: Vec<String> = self.dependencies.get(caller_id).into_iter().collect();
        if packages.is_empty() {
            return None;
        }

        debug!("Installing {} package(s) for {}", packages.len(), caller_id);
        match self.run_phase(Phase::Install, install, workspace, &packages, None) {
            Ok(outcome) if outcome.success() => None,
            Ok(outcome) => {
                let reason = if outcome.timed_out {
                    format!("timed out after {}ms", install.timeout_ms)
                } else {
                    match (outcome.exit_code, outcome.signal) {
                        (Some(code), _) => format!("exited with code {}", code),
                        (None, Some(signal)) => format!("killed by signal {}", signal),
                        (None, None) => "failed".to_string(),
                    }
                };
                warn!("Dependency install for {} {}", caller_id, reason);
                let mut warning = format!("warning: dependency install {}\n", reason);
                warning.push_str(&outcome.stderr_lossy());
                Some(warning)
            }
            Err(e) => {
                warn!("Dependency install for {} could not start: {}", caller_id, e);
                Some(format!("warning: dependency install could not start: {}\n", e))
            }
        }
    }

    fn run_phase(
        &self,
        phase: Phase,
        spec: &PhaseSpec,
        workspace: &Workspace,
        packages: &[String],
        stdin: Option<&[u8]>,
    ) -> Result<RunOutcome> {
        let argv = spec.resolve_argv(workspace, packages);
        debug!("{} argv for {}: {:?}", phase, workspace.run_id(), argv);
        self.runner.run(&PhaseInvocation {
            phase,
            argv,
            workdir: workspace.root(),
            timeout: spec.timeout(),
            limits: &spec.limits,
            environment: spec.resolve_env(workspace),
            stdin,
        })
    }

    /// Union `packages` into the caller's stored set.
    pub fn add_dependencies<S: AsRef<str>>(
        &self,
        caller_id: &str,
        packages: &[S],
    ) -> Result<BTreeSet<String>> {
        self.dependencies.add(caller_id, packages)
    }

    pub fn dependencies(&self, caller_id: &str) -> BTreeSet<String> {
        self.dependencies.get(caller_id)
    }

    /// Most recent runs for a caller, newest first.
    pub fn history(&self, caller_id: &str, limit: usize) -> Result<Vec<LedgerEntry>> {
        self.ledger.recent(caller_id, limit)
    }

    pub fn detect(&self, code: &str) -> Language {
        detect(code)
    }

    pub fn pipelines(&self) -> &PipelineTable {
        &self.pipelines
    }
}

impl Executor for Engine {
    fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionReply> {
        Engine::execute(self, request)
    }

    fn supported_languages(&self) -> Vec<Language> {
        self.pipelines.languages().collect()
    }
}
