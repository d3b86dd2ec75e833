/// Process runner: one child, one deadline, capped output
use crate::config::types::{Phase, ResourceLimits, Result, RunOutcome, SandboxError};
use crate::kernel::rlimit::{self, LimitReport};
use crate::kernel::signal::kill_process_group;
use crate::utils::output::{OutputLimits, StreamCollector};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::net::UnixStream;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// Default PATH handed to children.
pub const DEFAULT_SEARCH_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

/// Everything needed to launch one phase.
#[derive(Debug, Clone)]
pub struct PhaseInvocation<'a> {
    pub phase: Phase,
    pub argv: Vec<String>,
    pub workdir: &'a Path,
    pub timeout: Duration,
    pub limits: &'a ResourceLimits,
    pub environment: Vec<(String, String)>,
    pub stdin: Option<&'a [u8]>,
}

/// Launches children with limits applied and a wall-clock deadline.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    output: OutputLimits,
    search_path: String,
    poll_interval: Duration,
    /// How long to wait for pipes to close after the child is gone
    drain_grace: Duration,
}

impl ProcessRunner {
    pub fn new(output: OutputLimits, search_path: impl Into<String>) -> Self {
        Self {
            output,
            search_path: search_path.into(),
            poll_interval: Duration::from_millis(10),
            drain_grace: Duration::from_millis(500),
        }
    }

    pub fn output_limits(&self) -> &OutputLimits {
        &self.output
    }

    /// Run one child to completion or deadline.
    ///
    /// Non-zero exits, signals and timeouts are returned as data; only
    /// failures to launch or wait are errors.
    pub fn run(&self, inv: &PhaseInvocation<'_>) -> Result<RunOutcome> {
        let program = inv
            .argv
            .first()
            .ok_or_else(|| SandboxError::Process(format!("empty {} command", inv.phase)))?;

        if !inv.workdir.is_dir() {
            return Err(SandboxError::Workspace(format!(
                "working directory missing: {}",
                inv.workdir.display()
            )));
        }

        // Close-on-exec socket pair carrying the child's limit report.
        let (mut report_rx, report_tx) = UnixStream::pair()?;
        let report_fd = report_tx.as_raw_fd();
        let limits = inv.limits.clone();

        let mut cmd = Command::new(program);
        cmd.args(&inv.argv[1..])
            .current_dir(inv.workdir)
            .env_clear()
            .env("PATH", &self.search_path)
            .env("HOME", inv.workdir)
            .env("TMPDIR", inv.workdir)
            .env("LANG", "C.UTF-8")
            .envs(inv.environment.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(if inv.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0);
        rlimit::install(&mut cmd, limits, report_fd);

        log::debug!("Spawning {} phase: {:?}", inv.phase, inv.argv);
        let started = Instant::now();
        let spawn_result = cmd.spawn();
        drop(report_tx);
        let mut child = spawn_result
            .map_err(|e| SandboxError::Spawn(format!("{}: {}", program, e)))?;
        let pgid = child.id();

        rlimit::log_report(read_report(&mut report_rx), program, inv.limits);

        if let (Some(data), Some(mut stdin)) = (inv.stdin, child.stdin.take()) {
            let data = data.to_vec();
            std::thread::spawn(move || {
                // The child may exit without reading; EPIPE is expected.
                let _ = stdin.write_all(&data);
            });
        }

        let stdout = child
            .stdout
            .take()
            .map(|s| StreamCollector::spawn(s, self.output.stdout_limit));
        let stderr = child
            .stderr
            .take()
            .map(|s| StreamCollector::spawn(s, self.output.stderr_limit));

        let mut timed_out = false;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if started.elapsed() >= inv.timeout {
                        timed_out = true;
                        kill_process_group(pgid);
                        match child.wait() {
                            Ok(status) => break status,
                            Err(e) => {
                                return Err(SandboxError::Process(format!(
                                    "wait({}) after timeout: {}",
                                    program, e
                                )))
                            }
                        }
                    }
                    std::thread::sleep(self.poll_interval);
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    kill_process_group(pgid);
                    let _ = child.wait();
                    return Err(SandboxError::Process(format!("wait({}): {}", program, e)));
                }
            }
        };
        let wall_time_ms = started.elapsed().as_millis() as u64;

        // Reap anything the child left running in its group.
        kill_process_group(pgid);

        let stdout = stdout
            .map(|c| c.finish(self.drain_grace))
            .unwrap_or_default();
        let stderr = stderr
            .map(|c| c.finish(self.drain_grace))
            .unwrap_or_default();

        if timed_out {
            log::info!(
                "{} phase of {} exceeded {:?}; process group killed",
                inv.phase,
                program,
                inv.timeout
            );
        }

        Ok(RunOutcome {
            stdout: stdout.data,
            stderr: stderr.data,
            exit_code: status.code(),
            signal: status.signal(),
            timed_out,
            phase: inv.phase,
            stdout_truncated: stdout.truncated,
            stderr_truncated: stderr.truncated,
            wall_time_ms,
        })
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(OutputLimits::default(), DEFAULT_SEARCH_PATH)
    }
}

fn read_report(rx: &mut UnixStream) -> Option<LimitReport> {
    // The child wrote before exec, and spawn() only returns after exec.
    if rx.set_nonblocking(true).is_err() {
        return None;
    }
    let mut byte = [0u8; 1];
    match rx.read(&mut byte) {
        Ok(1) => LimitReport::from_byte(byte[0]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn workdir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("snipbox_runner_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    fn invoke<'a>(
        argv: Vec<String>,
        dir: &'a Path,
        limits: &'a ResourceLimits,
        timeout: Duration,
    ) -> PhaseInvocation<'a> {
        PhaseInvocation {
            phase: Phase::Run,
            argv,
            workdir: dir,
            timeout,
            limits,
            environment: Vec::new(),
            stdin: None,
        }
    }

    #[test]
    fn captures_stdout_stderr_and_exit_code() {
        let dir = workdir("capture");
        let limits = ResourceLimits::default();
        let runner = ProcessRunner::default();

        let out = runner
            .run(&invoke(sh("echo out; echo err >&2; exit 3"), &dir, &limits, Duration::from_secs(5)))
            .unwrap();
        assert_eq!(out.stdout, b"out\n");
        assert_eq!(out.stderr, b"err\n");
        assert_eq!(out.exit_code, Some(3));
        assert!(!out.timed_out);
        assert!(!out.success());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn timeout_kills_the_whole_group() {
        let dir = workdir("timeout");
        let limits = ResourceLimits::default();
        let runner = ProcessRunner::default();

        let started = Instant::now();
        let out = runner
            .run(&invoke(
                sh("echo started; sleep 30 & while :; do sleep 1; done"),
                &dir,
                &limits,
                Duration::from_millis(300),
            ))
            .unwrap();
        assert!(out.timed_out);
        assert_eq!(out.stdout, b"started\n");
        assert!(started.elapsed() < Duration::from_secs(3));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn output_is_capped() {
        let dir = workdir("cap");
        let limits = ResourceLimits::default();
        let runner = ProcessRunner::new(
            OutputLimits {
                stdout_limit: 100,
                stderr_limit: 10,
            },
            DEFAULT_SEARCH_PATH,
        );

        let out = runner
            .run(&invoke(
                sh("i=0; while [ $i -lt 2000 ]; do echo line-$i; echo e >&2; i=$((i+1)); done"),
                &dir,
                &limits,
                Duration::from_secs(10),
            ))
            .unwrap();
        assert_eq!(out.stdout.len(), 100);
        assert!(out.stdout_truncated);
        assert_eq!(out.stderr.len(), 10);
        assert!(out.stderr_truncated);
        assert_eq!(out.exit_code, Some(0));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stdin_is_forwarded_and_env_is_scrubbed() {
        let dir = workdir("stdin");
        let limits = ResourceLimits::default();
        let runner = ProcessRunner::default();

        std::env::set_var("SNIPBOX_HOST_SECRET", "leak");
        let mut inv = invoke(
            sh("read line; echo \"got:$line\"; echo \"secret:${SNIPBOX_HOST_SECRET}\"; echo \"extra:$EXTRA\"; echo \"home:$HOME\""),
            &dir,
            &limits,
            Duration::from_secs(5),
        );
        inv.stdin = Some(&b"hello\n"[..]);
        inv.environment = vec![("EXTRA".to_string(), "1".to_string())];

        let out = runner.run(&inv).unwrap();
        let stdout = out.stdout_lossy();
        assert!(stdout.contains("got:hello"));
        assert!(stdout.contains("secret:\n"));
        assert!(stdout.contains("extra:1"));
        assert!(stdout.contains(&format!("home:{}", dir.display())));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn cpu_limit_terminates_spinning_child() {
        let dir = workdir("cpu");
        let limits = ResourceLimits {
            cpu_seconds: 1,
            ..ResourceLimits::default()
        };
        let runner = ProcessRunner::default();

        let out = runner
            .run(&invoke(sh("while :; do :; done"), &dir, &limits, Duration::from_secs(20)))
            .unwrap();
        assert!(!out.timed_out);
        assert!(out.signal.is_some());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let dir = workdir("missing");
        let limits = ResourceLimits::default();
        let runner = ProcessRunner::default();

        let err = runner
            .run(&invoke(
                vec!["/nonexistent/snipbox-tool".to_string()],
                &dir,
                &limits,
                Duration::from_secs(1),
            ))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Spawn(_)));
        assert!(err.is_infrastructure());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_workdir_is_an_error() {
        let limits = ResourceLimits::default();
        let runner = ProcessRunner::default();
        let dir = std::env::temp_dir().join("snipbox_runner_does_not_exist");

        let err = runner
            .run(&invoke(sh("true"), &dir, &limits, Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Workspace(_)));
    }
}
