//! Supervision of the protected command.
//!
//! The command runs in a process group of its own so a stop request reaches
//! everything it started, not just the direct child. Spawning, waiting and
//! stopping go through one [`ChildSlot`]. Once a stop has begun no new command
//! is started, and the stopping thread only lets the process exit after the
//! whole group is gone: exiting drops the `flock`, and the gate must not look
//! free while protected work is still running.
//!
//! When opgate owns the controlling terminal, the terminal is handed to the
//! command's group for the duration of the run so interactive commands can
//! read from it, and taken back afterwards.

use crate::error::{OpgateError, Result};
use nix::errno::Errno;
use nix::sys::signal::{SigSet, Signal, killpg};
use nix::unistd::{Pid, getpgrp, tcgetpgrp, tcsetpgrp};
use std::io::{self, IsTerminal};
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, ExitStatus};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

/// How long a stopped group gets before it is killed outright.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// The slot used by `opgate run` and the signal paths.
pub static ACTIVE: ChildSlot = ChildSlot::new(true);

#[derive(Debug)]
struct SlotState {
    pgid: Option<Pid>,
    stopping: bool,
    has_terminal: bool,
}

/// Tracks the process group of the one command that may be running.
#[derive(Debug)]
pub struct ChildSlot {
    state: Mutex<SlotState>,
    take_terminal: bool,
}

impl ChildSlot {
    pub const fn new(take_terminal: bool) -> Self {
        Self {
            state: Mutex::new(SlotState {
                pgid: None,
                stopping: false,
                has_terminal: false,
            }),
            take_terminal,
        }
    }

    fn state(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start `command` as the leader of a new process group.
    pub fn spawn(&self, mut command: Command, program: &str) -> Result<Child> {
        let mut state = self.state();
        if state.stopping {
            return Err(OpgateError::UserError(format!(
                "not starting '{}': opgate is shutting down",
                program
            )));
        }

        let child = command.process_group(0).spawn().map_err(|e| {
            OpgateError::UserError(format!("failed to start '{}': {}", program, e))
        })?;
        let pgid = i32::try_from(child.id())
            .map(Pid::from_raw)
            .map_err(|_| OpgateError::UserError(format!("pid of '{}' out of range", program)))?;
        state.pgid = Some(pgid);
        tracing::debug!(pgid = pgid.as_raw(), "protected command started");

        if self.take_terminal {
            state.has_terminal = hand_terminal_to(pgid);
        }
        Ok(child)
    }

    /// Wait for the child started by [`spawn`](Self::spawn).
    ///
    /// Returns `Ok(None)` when a stop is in progress. The caller must then
    /// keep the gate held and leave exiting to the stopping thread.
    pub fn wait(&self, child: &mut Child) -> io::Result<Option<ExitStatus>> {
        let status = child.wait();

        let mut state = self.state();
        if state.has_terminal {
            reclaim_terminal();
            state.has_terminal = false;
        }
        if state.stopping {
            return Ok(None);
        }
        state.pgid = None;
        status.map(Some)
    }

    /// Forward `signal` to the running command's group and block until every
    /// process in it has exited. A group still alive after `grace` is sent
    /// `SIGKILL`.
    ///
    /// Also forbids any later [`spawn`](Self::spawn). Returns whether a
    /// command was running.
    pub fn stop(&self, signal: Signal, grace: Duration) -> bool {
        let pgid = {
            let mut state = self.state();
            state.stopping = true;
            state.pgid
        };
        let Some(pgid) = pgid else {
            return false;
        };

        tracing::info!(pgid = pgid.as_raw(), signal = %signal, "stopping protected command");
        send(pgid, signal);
        // Wake the group in case it was stopped by job control.
        send(pgid, Signal::SIGCONT);

        if !wait_until_gone(pgid, grace) {
            tracing::warn!(pgid = pgid.as_raw(), "protected command still running, killing");
            send(pgid, Signal::SIGKILL);
            if !wait_until_gone(pgid, grace) {
                tracing::error!(pgid = pgid.as_raw(), "protected command survived SIGKILL");
            }
        }
        true
    }
}

/// Never returns. Used by a thread that must not release the gate because
/// another thread is stopping the command and will end the process.
pub fn park_until_exit() -> ! {
    loop {
        thread::park();
    }
}

fn send(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!(pgid = pgid.as_raw(), signal = %signal, error = %e, "killpg failed"),
    }
}

fn group_alive(pgid: Pid) -> bool {
    !matches!(killpg(pgid, None), Err(Errno::ESRCH))
}

fn wait_until_gone(pgid: Pid, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while group_alive(pgid) {
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
    true
}

/// Make `pgid` the terminal's foreground group if we are in the foreground.
fn hand_terminal_to(pgid: Pid) -> bool {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return false;
    }
    match tcgetpgrp(&stdin) {
        Ok(foreground) if foreground == getpgrp() => {}
        _ => return false,
    }
    if let Err(e) = tcsetpgrp(&stdin, pgid) {
        tracing::warn!(error = %e, "could not hand the terminal to the protected command");
        return false;
    }
    // A read before the handover stops the command with SIGTTIN.
    send(pgid, Signal::SIGCONT);
    true
}

fn reclaim_terminal() {
    // tcsetpgrp from a background group raises SIGTTOU unless it is blocked.
    let mut ttou = SigSet::empty();
    ttou.add(Signal::SIGTTOU);
    if let Err(e) = ttou.thread_block() {
        tracing::warn!(error = %e, "failed to block SIGTTOU");
    }
    if let Err(e) = tcsetpgrp(io::stdin(), getpgrp()) {
        tracing::warn!(error = %e, "could not take the terminal back");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::unistd::getpgid;
    use std::sync::Arc;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_command_leads_its_own_group() {
        let slot = ChildSlot::new(false);
        let mut child = slot.spawn(sh("sleep 5"), "sh").unwrap();
        let pid = Pid::from_raw(child.id() as i32);

        assert_eq!(getpgid(Some(pid)).unwrap(), pid);
        assert_ne!(pid, getpgrp());

        child.kill().unwrap();
        assert!(slot.wait(&mut child).unwrap().is_some());
    }

    #[test]
    fn test_wait_reports_exit_status() {
        let slot = ChildSlot::new(false);
        let mut child = slot.spawn(sh("exit 4"), "sh").unwrap();

        let status = slot.wait(&mut child).unwrap().unwrap();

        assert_eq!(status.code(), Some(4));
        assert!(!slot.stop(Signal::SIGTERM, Duration::from_secs(1)));
    }

    #[test]
    fn test_stop_without_command_is_a_noop() {
        let slot = ChildSlot::new(false);
        assert!(!slot.stop(Signal::SIGINT, Duration::from_secs(1)));
    }

    #[test]
    fn test_stop_reaches_every_process_in_the_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let pidfile = dir.path().join("grandchild");
        let slot = Arc::new(ChildSlot::new(false));

        let script = format!("sleep 30 & echo $! > {}; wait", pidfile.display());
        let mut child = slot.spawn(sh(&script), "sh").unwrap();
        let pgid = Pid::from_raw(child.id() as i32);

        let start = Instant::now();
        while !pidfile.exists() || std::fs::read_to_string(&pidfile).unwrap().trim().is_empty() {
            assert!(start.elapsed() < Duration::from_secs(5), "grandchild never started");
            thread::sleep(Duration::from_millis(20));
        }
        let grandchild: i32 = std::fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();

        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait(&mut child).unwrap())
        };

        assert!(slot.stop(Signal::SIGTERM, Duration::from_secs(5)));
        assert!(!group_alive(pgid));
        assert_eq!(
            nix::sys::signal::kill(Pid::from_raw(grandchild), None),
            Err(Errno::ESRCH)
        );
        // The waiter is told a stop is underway instead of getting a status.
        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn test_group_ignoring_sigterm_is_killed_after_grace() {
        let dir = tempfile::TempDir::new().unwrap();
        let ready = dir.path().join("ready");
        let slot = Arc::new(ChildSlot::new(false));

        let script = format!(
            "trap '' TERM; touch {}; while :; do sleep 0.1; done",
            ready.display()
        );
        let mut child = slot.spawn(sh(&script), "sh").unwrap();
        let pgid = Pid::from_raw(child.id() as i32);
        let start = Instant::now();
        while !ready.exists() {
            assert!(start.elapsed() < Duration::from_secs(5), "command never started");
            thread::sleep(Duration::from_millis(20));
        }

        let waiter = {
            let slot = Arc::clone(&slot);
            thread::spawn(move || slot.wait(&mut child).unwrap())
        };

        assert!(slot.stop(Signal::SIGTERM, Duration::from_millis(300)));
        assert!(!group_alive(pgid));
        assert!(waiter.join().unwrap().is_none());
    }

    #[test]
    fn test_no_spawn_after_stop() {
        let slot = ChildSlot::new(false);
        slot.stop(Signal::SIGINT, Duration::from_secs(1));

        let err = slot.spawn(sh("true"), "sh").unwrap_err();

        assert!(err.to_string().contains("shutting down"));
    }
}
