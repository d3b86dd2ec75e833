/// Process-group termination
///
/// Every child is started as the leader of its own process group, so a
/// compiler that forks helpers or a snippet that spawns background work is
/// torn down as one unit.
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;

/// Outcome of a group kill.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KillOutcome {
    /// SIGKILL delivered to the whole group
    Group,
    /// Group kill was refused; the leader alone was signalled
    LeaderOnly,
    /// No process left in the group
    AlreadyGone,
    Failed,
}

/// Send SIGKILL to every process in the group led by `pgid`.
pub fn kill_process_group(pgid: u32) -> KillOutcome {
    let pid = Pid::from_raw(pgid as i32);

    match killpg(pid, Signal::SIGKILL) {
        Ok(()) => KillOutcome::Group,
        Err(Errno::ESRCH) => KillOutcome::AlreadyGone,
        Err(group_err) => match kill(pid, Signal::SIGKILL) {
            Ok(()) => {
                log::warn!("group SIGKILL fallback used for {}: {}", pgid, group_err);
                KillOutcome::LeaderOnly
            }
            Err(Errno::ESRCH) => KillOutcome::AlreadyGone,
            Err(e) => {
                log::warn!("Failed to SIGKILL process group {}: {} / {}", pgid, group_err, e);
                KillOutcome::Failed
            }
        },
    }
}
