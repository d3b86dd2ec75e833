// Startup validation: fail fast on configs that would make every run fail
// or make the engine unusable.

use crate::config::engine::EngineConfig;
use crate::config::types::{Result, SandboxError};
use crate::judge::pipeline::{LanguagePipeline, PhaseSpec};

/// Address-space limits below this are almost certainly a typo.
const MIN_SANE_ADDRESS_SPACE: u64 = 64 * 1024 * 1024;

/// Validation result with detailed errors
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate config at startup. Errors are fatal; warnings are logged.
pub fn validate_config(config: &EngineConfig) -> Result<ValidationResult> {
    let mut result = ValidationResult::new();

    validate_engine(config, &mut result);
    for pipeline in config.effective_pipelines().values() {
        validate_pipeline(pipeline, &mut result);
    }

    for warning in &result.warnings {
        log::warn!("Config: {}", warning);
    }

    if !result.is_valid() {
        return Err(SandboxError::Config(format!(
            "Config validation failed:\n{}",
            result.errors.join("\n")
        )));
    }

    Ok(result)
}

fn validate_engine(config: &EngineConfig, result: &mut ValidationResult) {
    if config.max_concurrent_runs == 0 {
        result.add_error("max_concurrent_runs cannot be zero".to_string());
    }
    if config.stdout_cap == 0 {
        result.add_error("stdout_cap cannot be zero".to_string());
    }
    if config.stderr_cap == 0 {
        result.add_error("stderr_cap cannot be zero".to_string());
    }
    if config.search_path.trim().is_empty() {
        result.add_error("search_path cannot be empty".to_string());
    }
    if config.workspace_root.as_os_str().is_empty() {
        result.add_error("workspace_root cannot be empty".to_string());
    }
    if config.state_dir.as_os_str().is_empty() {
        result.add_error("state_dir cannot be empty".to_string());
    }
}

fn validate_pipeline(pipeline: &LanguagePipeline, result: &mut ValidationResult) {
    let language = pipeline.language;

    if pipeline.file_name.is_empty() || pipeline.file_name.contains('/') {
        result.add_error(format!(
            "{}: file_name must be a bare file name, got {:?}",
            language, pipeline.file_name
        ));
    }

    if let Some(compile) = &pipeline.compile {
        validate_phase(&format!("{} compile", language), compile, result);
    }
    if let Some(install) = &pipeline.install {
        validate_phase(&format!("{} install", language), install, result);
    }
    validate_phase(&format!("{} run", language), &pipeline.run, result);
}

fn validate_phase(label: &str, phase: &PhaseSpec, result: &mut ValidationResult) {
    match phase.command.first() {
        None => result.add_error(format!("{}: command cannot be empty", label)),
        Some(program) if program.trim().is_empty() => {
            result.add_error(format!("{}: program name cannot be blank", label))
        }
        Some(_) => {}
    }

    if phase.timeout_ms == 0 {
        result.add_error(format!("{}: timeout_ms cannot be zero", label));
    }

    if phase.limits.cpu_seconds == 0 {
        result.add_warning(format!(
            "{}: cpu_seconds is zero, will be raised to 1 at launch",
            label
        ));
    }

    if phase.limits.max_address_space_bytes < MIN_SANE_ADDRESS_SPACE {
        result.add_warning(format!(
            "{}: max_address_space_bytes {} is very low (< 64MB), most runtimes will fail to start",
            label, phase.limits.max_address_space_bytes
        ));
    }

    if phase.limits.core_dump_bytes != 0 {
        result.add_warning(format!(
            "{}: core dumps enabled ({} bytes) for untrusted code",
            label, phase.limits.core_dump_bytes
        ));
    }
}
