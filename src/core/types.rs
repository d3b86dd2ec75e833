use crate::config::types::{ExecutionStatus, Language, Phase};
use serde::{Deserialize, Serialize};

/// One snippet to run on behalf of a caller. Immutable once built.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRequest {
    caller_id: String,
    language_hint: Option<String>,
    code: String,
    stdin: Option<String>,
}

impl ExecutionRequest {
    pub fn new(caller_id: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            caller_id: caller_id.into(),
            language_hint: None,
            code: code.into(),
            stdin: None,
        }
    }

    pub fn with_language(mut self, hint: impl Into<String>) -> Self {
        self.language_hint = Some(hint.into());
        self
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn caller_id(&self) -> &str {
        &self.caller_id
    }

    pub fn language_hint(&self) -> Option<&str> {
        self.language_hint.as_deref()
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }
}

/// What a caller gets back from a completed run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionReply {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub language: Language,
    pub status: ExecutionStatus,
    /// Phase that produced the final outcome
    pub phase: Phase,
    pub ledger_id: u64,
    #[serde(default)]
    pub stdout_truncated: bool,
    #[serde(default)]
    pub stderr_truncated: bool,
    #[serde(default)]
    pub wall_time_ms: u64,
}

impl ExecutionReply {
    pub fn success(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    /// Plain-text rendering for chat-style front ends.
    pub fn render_plain(&self) -> String {
        let mut text = String::new();
        if !self.stdout.is_empty() {
            text.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&self.stderr);
        }
        if text.trim().is_empty() {
            text = "(no output)".to_string();
        }
        if self.timed_out {
            if !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str("[timed out]");
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(stdout: &str, stderr: &str, timed_out: bool) -> ExecutionReply {
        ExecutionReply {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(0),
            timed_out,
            language: Language::Python,
            status: ExecutionStatus::Ok,
            phase: Phase::Run,
            ledger_id: 1,
            stdout_truncated: false,
            stderr_truncated: false,
            wall_time_ms: 0,
        }
    }

    #[test]
    fn builder_sets_optional_fields() {
        let req = ExecutionRequest::new("alice", "print(1)")
            .with_language("py")
            .with_stdin("input");
        assert_eq!(req.caller_id(), "alice");
        assert_eq!(req.language_hint(), Some("py"));
        assert_eq!(req.stdin(), Some("input"));
        assert_eq!(req.code(), "print(1)");
    }

    #[test]
    fn empty_output_renders_placeholder() {
        assert_eq!(reply("", "", false).render_plain(), "(no output)");
        assert_eq!(reply("  \n", "", false).render_plain(), "(no output)");
    }

    #[test]
    fn plain_rendering_joins_streams() {
        assert_eq!(reply("out", "err\n", false).render_plain(), "out\nerr\n");
        assert_eq!(reply("", "", true).render_plain(), "(no output)\n[timed out]");
    }
}
