//! Integration tests for kernel module
//!
//! These tests verify that limits and group termination hold once wired
//! through the process runner.

use snipbox::exec::runner::{PhaseInvocation, ProcessRunner};
use snipbox::kernel::signal::{kill_process_group, KillOutcome};
use snipbox::{Phase, ResourceLimits};
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn workdir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("snipbox_kernel_{}_{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn sh(script: &str) -> Vec<String> {
    vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
}

#[test]
fn test_limits_are_visible_to_the_child() {
    let dir = workdir("visible");
    let limits = ResourceLimits {
        cpu_seconds: 7,
        max_address_space_bytes: 300 * 1024 * 1024,
        core_dump_bytes: 0,
    };

    let outcome = ProcessRunner::default()
        .run(&PhaseInvocation {
            phase: Phase::Run,
            argv: sh("ulimit -t; ulimit -c; ulimit -v"),
            workdir: &dir,
            timeout: Duration::from_secs(5),
            limits: &limits,
            environment: Vec::new(),
            stdin: None,
        })
        .unwrap();

    let stdout = outcome.stdout_lossy();
    let lines: Vec<&str> = stdout.lines().collect();
    // `ulimit -v` reports kilobytes.
    assert_eq!(lines, vec!["7", "0", "307200"]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_child_cannot_raise_its_limits() {
    if unsafe { libc::geteuid() } == 0 {
        println!("skipping: root may raise hard limits");
        return;
    }
    let dir = workdir("raise");
    let limits = ResourceLimits {
        cpu_seconds: 3,
        ..ResourceLimits::default()
    };

    // Hard limit is cpu + 1; asking for more must fail.
    let outcome = ProcessRunner::default()
        .run(&PhaseInvocation {
            phase: Phase::Run,
            argv: sh("ulimit -t 100 2>/dev/null && echo raised || echo denied"),
            workdir: &dir,
            timeout: Duration::from_secs(5),
            limits: &limits,
            environment: Vec::new(),
            stdin: None,
        })
        .unwrap();
    assert_eq!(outcome.stdout_lossy(), "denied\n");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_timeout_reaps_background_descendants() {
    let dir = workdir("descendants");
    let marker = dir.join("survivor");
    let limits = ResourceLimits::default();

    let script = format!(
        "(sleep 1; touch {}) & while :; do sleep 0.05; done",
        marker.display()
    );
    let started = Instant::now();
    let outcome = ProcessRunner::default()
        .run(&PhaseInvocation {
            phase: Phase::Run,
            argv: sh(&script),
            workdir: &dir,
            timeout: Duration::from_millis(300),
            limits: &limits,
            environment: Vec::new(),
            stdin: None,
        })
        .unwrap();
    assert!(outcome.timed_out);
    assert!(started.elapsed() < Duration::from_secs(3));

    // Give a surviving subshell time to act; it must not.
    std::thread::sleep(Duration::from_millis(1500));
    assert!(!marker.exists(), "background child outlived the timeout");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_idempotency_of_group_kill() {
    use std::os::unix::process::CommandExt;

    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .process_group(0)
        .spawn()
        .unwrap();
    let pgid = child.id();

    assert_eq!(kill_process_group(pgid), KillOutcome::Group);
    child.wait().unwrap();
    // Second kill after reaping finds nothing to signal.
    assert_eq!(kill_process_group(pgid), KillOutcome::AlreadyGone);
}
