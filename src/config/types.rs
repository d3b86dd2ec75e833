/// Core types shared across the snipbox engine
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Engine-level errors.
///
/// Misbehaving snippets never surface here: compile errors, crashes and
/// timeouts are reported as [`ExecutionStatus`] values. Everything except
/// [`SandboxError::UnsupportedLanguage`] and [`SandboxError::InvalidPackage`]
/// is an infrastructure failure.
#[derive(Error, Debug)]
pub enum SandboxError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Spawn error: {0}")]
    Spawn(String),

    #[error("Process error: {0}")]
    Process(String),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Invalid package specification: {0}")]
    InvalidPackage(String),
}

impl SandboxError {
    /// True when the failure came from the host environment rather than
    /// from the caller's input.
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            SandboxError::UnsupportedLanguage(_) | SandboxError::InvalidPackage(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;

/// Closed set of languages the engine knows how to run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Javascript,
    C,
    Cpp,
    Java,
    Php,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::Javascript,
        Language::C,
        Language::Cpp,
        Language::Java,
        Language::Php,
    ];

    /// Canonical identifier, as stored in the ledger and config.
    pub fn id(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Javascript => "javascript",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
            Language::Php => "php",
        }
    }

    /// Human-readable name used by front ends.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::Python => "Python",
            Language::Javascript => "JavaScript",
            Language::C => "C",
            Language::Cpp => "C++",
            Language::Java => "Java",
            Language::Php => "PHP",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Language {
    type Err = SandboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "javascript" | "js" | "node" | "nodejs" => Ok(Language::Javascript),
            "c" => Ok(Language::C),
            "cpp" | "c++" | "cxx" | "cc" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            "php" => Ok(Language::Php),
            _ => Err(SandboxError::UnsupportedLanguage(s.to_string())),
        }
    }
}

/// Kernel resource limits applied to every spawned child.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// RLIMIT_CPU soft limit in seconds (hard limit is one second higher)
    pub cpu_seconds: u64,
    /// RLIMIT_AS in bytes
    pub max_address_space_bytes: u64,
    /// RLIMIT_CORE in bytes; always zero for untrusted code
    #[serde(default)]
    pub core_dump_bytes: u64,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        ResourceLimits {
            cpu_seconds: 5,
            max_address_space_bytes: 512 * 1024 * 1024,
            core_dump_bytes: 0,
        }
    }
}

/// Pipeline phase a [`RunOutcome`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Install,
    Compile,
    Run,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Install => write!(f, "install"),
            Phase::Compile => write!(f, "compile"),
            Phase::Run => write!(f, "run"),
        }
    }
}

/// Raw result of one child process.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOutcome {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub exit_code: Option<i32>,
    /// Signal that terminated the child, if it did not exit normally
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub phase: Phase,
    pub stdout_truncated: bool,
    pub stderr_truncated: bool,
    pub wall_time_ms: u64,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Status of a run as seen by callers.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Run phase exited with code 0
    #[serde(rename = "OK")]
    Ok,
    /// Compile phase exited non-zero; run never started
    #[serde(rename = "CE")]
    CompileError,
    /// Run phase exited non-zero
    #[serde(rename = "RE")]
    RuntimeError,
    /// Terminated by a signal (address-space or CPU limit, crash)
    #[serde(rename = "SIG")]
    Signaled,
    /// Wall-clock deadline exceeded in either phase
    #[serde(rename = "TLE")]
    TimeLimit,
}

impl ExecutionStatus {
    /// Classify the final outcome of a pipeline.
    pub fn classify(outcome: &RunOutcome) -> Self {
        if outcome.timed_out {
            ExecutionStatus::TimeLimit
        } else if outcome.phase == Phase::Compile && outcome.exit_code != Some(0) {
            ExecutionStatus::CompileError
        } else if outcome.signal.is_some() {
            ExecutionStatus::Signaled
        } else if outcome.exit_code == Some(0) {
            ExecutionStatus::Ok
        } else {
            ExecutionStatus::RuntimeError
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStatus::Ok => write!(f, "OK"),
            ExecutionStatus::CompileError => write!(f, "CE"),
            ExecutionStatus::RuntimeError => write!(f, "RE"),
            ExecutionStatus::Signaled => write!(f, "SIG"),
            ExecutionStatus::TimeLimit => write!(f, "TLE"),
        }
    }
}
