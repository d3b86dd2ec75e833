/// Kernel resource limits for spawned children
///
/// [`apply`] runs between fork and exec, so it only issues raw syscalls:
/// no allocation, no locking, no logging. Each limit is attempted
/// independently and failures are recorded in a [`LimitReport`] that the
/// parent reads back over a pipe and logs.
///
/// Limit failures never abort a launch. The runner's wall-clock deadline is
/// the authoritative backstop: CPU accounting does not catch a child that
/// sleeps or blocks on I/O.
use crate::config::types::ResourceLimits;
use nix::sys::resource::{setrlimit, Resource};
use std::os::fd::RawFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

const CORE_FAILED: u8 = 0b001;
const CPU_FAILED: u8 = 0b010;
const ADDRESS_SPACE_FAILED: u8 = 0b100;
/// Set on every report written by [`apply`], so a zero byte means "never ran".
const REPORT_VALID: u8 = 0b1000_0000;

/// Which limits could not be applied in the child
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LimitReport(u8);

impl LimitReport {
    pub fn from_byte(byte: u8) -> Option<Self> {
        if byte & REPORT_VALID == 0 {
            None
        } else {
            Some(Self(byte))
        }
    }

    pub fn as_byte(self) -> u8 {
        self.0
    }

    pub fn all_applied(self) -> bool {
        self.0 & !REPORT_VALID == 0
    }

    /// Names of the limits that failed, in application order.
    pub fn failed(self) -> Vec<&'static str> {
        let mut failed = Vec::new();
        if self.0 & CORE_FAILED != 0 {
            failed.push("RLIMIT_CORE");
        }
        if self.0 & CPU_FAILED != 0 {
            failed.push("RLIMIT_CPU");
        }
        if self.0 & ADDRESS_SPACE_FAILED != 0 {
            failed.push("RLIMIT_AS");
        }
        failed
    }
}

/// Apply limits to the current process. Order: core dumps, CPU, address space.
pub fn apply(limits: &ResourceLimits) -> LimitReport {
    let mut report = REPORT_VALID;

    let core = limits.core_dump_bytes as libc::rlim_t;
    if setrlimit(Resource::RLIMIT_CORE, core, core).is_err() {
        report |= CORE_FAILED;
    }

    // soft = limit -> SIGXCPU, hard = limit + 1 -> SIGKILL
    let cpu = limits.cpu_seconds.max(1) as libc::rlim_t;
    if setrlimit(Resource::RLIMIT_CPU, cpu, cpu.saturating_add(1)).is_err() {
        report |= CPU_FAILED;
    }

    let address_space = limits.max_address_space_bytes as libc::rlim_t;
    if setrlimit(Resource::RLIMIT_AS, address_space, address_space).is_err() {
        report |= ADDRESS_SPACE_FAILED;
    }

    LimitReport(report)
}

/// Pre-exec hook: apply limits and write the one-byte report to `report_fd`.
///
/// Always returns `Ok` so the child still execs when limits fail.
pub fn apply_and_report(limits: &ResourceLimits, report_fd: RawFd) -> std::io::Result<()> {
    let report = apply(limits).as_byte();
    unsafe {
        libc::write(report_fd, &report as *const u8 as *const libc::c_void, 1);
    }
    Ok(())
}

/// Register the pre-exec hook on `cmd`.
///
/// `report_fd` must stay open in the parent until `spawn` returns.
pub fn install(cmd: &mut Command, limits: ResourceLimits, report_fd: RawFd) {
    // SAFETY: the hook only calls setrlimit and write, both async-signal-safe.
    unsafe {
        cmd.pre_exec(move || apply_and_report(&limits, report_fd));
    }
}

/// Log a report received from a child.
pub fn log_report(report: Option<LimitReport>, program: &str, limits: &ResourceLimits) {
    match report {
        Some(report) if report.all_applied() => {
            log::debug!(
                "Limits applied to {}: cpu={}s as={} core={}",
                program,
                limits.cpu_seconds,
                limits.max_address_space_bytes,
                limits.core_dump_bytes
            );
        }
        Some(report) => {
            log::warn!(
                "Failed to apply {} for {}; relying on wall-clock deadline",
                report.failed().join(", "),
                program
            );
        }
        None => {
            log::warn!(
                "No limit report received from {}; relying on wall-clock deadline",
                program
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_round_trips_failures() {
        let report = LimitReport(REPORT_VALID | CPU_FAILED | ADDRESS_SPACE_FAILED);
        let parsed = LimitReport::from_byte(report.as_byte()).unwrap();
        assert!(!parsed.all_applied());
        assert_eq!(parsed.failed(), vec!["RLIMIT_CPU", "RLIMIT_AS"]);
    }

    #[test]
    fn zero_byte_is_not_a_report() {
        assert!(LimitReport::from_byte(0).is_none());
        assert!(LimitReport::from_byte(REPORT_VALID).unwrap().all_applied());
    }

    #[test]
    fn installed_hook_reports_back() {
        use std::io::Read;
        use std::os::fd::AsRawFd;
        use std::os::unix::net::UnixStream;

        let (mut rx, tx) = UnixStream::pair().unwrap();
        let limits = ResourceLimits {
            cpu_seconds: 2,
            ..ResourceLimits::default()
        };

        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "ulimit -t"]);
        install(&mut cmd, limits, tx.as_raw_fd());
        let output = cmd.output().expect("spawn /bin/sh");
        drop(tx);

        assert_eq!(String::from_utf8_lossy(&output.stdout), "2\n");
        let mut byte = [0u8; 1];
        rx.read_exact(&mut byte).unwrap();
        assert!(LimitReport::from_byte(byte[0]).is_some());
    }

    #[test]
    fn limits_bind_a_forked_child() {
        let limits = ResourceLimits {
            cpu_seconds: 3,
            max_address_space_bytes: 256 * 1024 * 1024,
            core_dump_bytes: 0,
        };

        let mut cmd = Command::new("/bin/sh");
        cmd.args(["-c", "ulimit -t; ulimit -c"]);
        unsafe {
            cmd.pre_exec(move || {
                apply(&limits);
                Ok(())
            });
        }
        let output = cmd.output().expect("spawn /bin/sh");
        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines, vec!["3", "0"]);
    }
}
