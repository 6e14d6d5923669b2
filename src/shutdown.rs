//! Stopping a daemon from the outside, knowing only its pid file.
//!
//! Nothing here refers to a `Daemon` or `Daemonizer`: a short-lived
//! `stop` invocation can call [`kill`] with a path and a timeout.

use crate::error::{DaemonError, DaemonResult};
use crate::pid_file::PidFile;
use crate::signals::Signal;
use crate::sys::unix;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

/// How often the pid file is checked while waiting for a daemon to exit.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How a stop request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No pid file, or it named a process that no longer exists.
    NotRunning,
    /// The daemon exited on its own and removed its pid file in time.
    Stopped,
    /// The timeout expired and KILL was sent. The daemon never got to run
    /// its cleanup; the pid file it left behind has been deleted.
    Killed,
}

/// Stops the daemon recorded in `pid_file`: INT first, KILL if the pid
/// file is still there after `timeout`.
pub fn kill<P: AsRef<Path>>(pid_file: P, timeout: Duration) -> DaemonResult<StopOutcome> {
    send_signal(Signal::Interrupt, pid_file, timeout)
}

/// Runs the stop protocol with an arbitrary graceful signal.
pub fn send_signal<P: AsRef<Path>>(
    signal: Signal,
    pid_file: P,
    timeout: Duration,
) -> DaemonResult<StopOutcome> {
    let pid_file = PidFile::new(pid_file.as_ref());
    let Some(pid) = recorded_pid(&pid_file)? else {
        tracing::info!("Can't stop process, no PID found in {}", pid_file.path().display());
        return Ok(StopOutcome::NotRunning);
    };

    if signal == Signal::Kill {
        return force_kill(pid, &pid_file);
    }

    tracing::info!("Sending {} signal to process {} ...", signal, pid);
    if !deliver(pid, signal)? {
        tracing::info!("Process {} not found, removing stale PID file", pid);
        pid_file.delete()?;
        return Ok(StopOutcome::NotRunning);
    }

    tracing::info!("Waiting {:.1} seconds for process {} to stop", timeout.as_secs_f64(), pid);
    if wait_for_removal(&pid_file, timeout) {
        tracing::info!("Process {} stopped", pid);
        return Ok(StopOutcome::Stopped);
    }

    tracing::warn!("Timeout! Process {} did not stop in time", pid);
    force_kill(pid, &pid_file)
}

/// Asks the daemon in `pid_file` to reload by sending it HUP.
///
/// Returns whether a live process received the signal.
pub fn restart<P: AsRef<Path>>(pid_file: P) -> DaemonResult<bool> {
    let pid_file = PidFile::new(pid_file.as_ref());
    let Some(pid) = recorded_pid(&pid_file)? else {
        tracing::info!("Can't restart, no PID found in {}", pid_file.path().display());
        return Ok(false);
    };
    tracing::info!("Sending HUP signal to process {} ...", pid);
    if deliver(pid, Signal::Hangup)? {
        return Ok(true);
    }
    tracing::info!("Process {} not found, removing stale PID file", pid);
    pid_file.delete()?;
    Ok(false)
}

fn recorded_pid(pid_file: &PidFile) -> DaemonResult<Option<i32>> {
    match pid_file.read() {
        Ok(pid) => Ok(Some(pid)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// `Ok(false)` when the process is already gone.
fn deliver(pid: i32, signal: Signal) -> DaemonResult<bool> {
    match unix::kill(pid, signal.as_raw()) {
        Ok(()) => Ok(true),
        Err(err) => match err.raw_os_error() {
            Some(libc::ESRCH) => Ok(false),
            Some(libc::EPERM) => Err(DaemonError::NotPermitted { operation: "kill", source: err }),
            _ => Err(err.into()),
        },
    }
}

/// Polls until the pid file is gone. Never sleeps past the deadline.
fn wait_for_removal(pid_file: &PidFile, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_file.exists() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tracing::debug!("{} still present", pid_file.path().display());
        thread::sleep(deadline.saturating_duration_since(now).min(POLL_INTERVAL));
    }
}

fn force_kill(pid: i32, pid_file: &PidFile) -> DaemonResult<StopOutcome> {
    tracing::info!("Sending KILL signal to process {} ...", pid);
    if !deliver(pid, Signal::Kill)? {
        tracing::info!("Process {} already gone", pid);
    }
    pid_file.delete()?;
    Ok(StopOutcome::Killed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::process::ExitStatusExt;
    use std::path::PathBuf;
    use std::process::{Child, Command};
    use tempfile::tempdir;

    /// Starts `sh` with `trap_line`, then has it record its own pid.
    fn spawn_shell_daemon(trap_line: &str, pid_path: &Path) -> Child {
        let script = format!(
            "{trap_line}\necho $$ > '{}'\nwhile :; do sleep 0.05; done",
            pid_path.display()
        );
        let child = Command::new("sh").arg("-c").arg(script).spawn().unwrap();
        let pid_file = PidFile::new(pid_path);
        let deadline = Instant::now() + Duration::from_secs(5);
        while pid_file.read().is_err() {
            assert!(Instant::now() < deadline, "shell never wrote its pid file");
            thread::sleep(Duration::from_millis(10));
        }
        child
    }

    fn pid_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("s.pid")
    }

    #[test]
    fn absent_pid_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        let started = Instant::now();
        let outcome = kill(pid_path(&dir), Duration::from_secs(5)).unwrap();
        assert_eq!(outcome, StopOutcome::NotRunning);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn garbage_pid_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        std::fs::write(pid_path(&dir), "0\n").unwrap();
        assert_eq!(kill(pid_path(&dir), Duration::from_secs(1)).unwrap(), StopOutcome::NotRunning);
    }

    #[test]
    fn binary_pid_file_is_a_no_op() {
        let dir = tempdir().unwrap();
        std::fs::write(pid_path(&dir), [0xff, 0xfe, 0x00, 0x31]).unwrap();
        assert_eq!(kill(pid_path(&dir), Duration::from_secs(1)).unwrap(), StopOutcome::NotRunning);
        assert!(!restart(pid_path(&dir)).unwrap());
    }

    #[test]
    fn dead_process_counts_as_stopped_and_stale_file_goes() {
        let dir = tempdir().unwrap();
        let mut child = Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        child.wait().unwrap();
        PidFile::new(pid_path(&dir)).write(pid).unwrap();

        assert_eq!(kill(pid_path(&dir), Duration::from_secs(1)).unwrap(), StopOutcome::NotRunning);
        assert!(!pid_path(&dir).exists());
    }

    #[test]
    fn graceful_exit_within_timeout() {
        let dir = tempdir().unwrap();
        let path = pid_path(&dir);
        let trap = format!("trap \"rm -f '{}'; exit 0\" INT", path.display());
        let mut child = spawn_shell_daemon(&trap, &path);

        let started = Instant::now();
        let outcome = kill(&path, Duration::from_secs(10)).unwrap();
        assert_eq!(outcome, StopOutcome::Stopped);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!path.exists());

        let status = child.wait().unwrap();
        assert_eq!(status.code(), Some(0));
    }

    #[test]
    fn ignored_interrupt_escalates_to_kill() {
        let dir = tempdir().unwrap();
        let path = pid_path(&dir);
        let mut child = spawn_shell_daemon("trap '' INT", &path);

        let started = Instant::now();
        let outcome = kill(&path, Duration::from_secs(1)).unwrap();
        let elapsed = started.elapsed();
        assert_eq!(outcome, StopOutcome::Killed);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(3), "stop took {elapsed:?}");
        assert!(!path.exists());

        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn sending_kill_skips_the_wait() {
        let dir = tempdir().unwrap();
        let path = pid_path(&dir);
        let mut child = spawn_shell_daemon("trap '' INT", &path);

        let started = Instant::now();
        let outcome = send_signal(Signal::Kill, &path, Duration::from_secs(30)).unwrap();
        assert_eq!(outcome, StopOutcome::Killed);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(child.wait().unwrap().signal(), Some(libc::SIGKILL));
    }

    #[test]
    fn restart_delivers_hangup() {
        let dir = tempdir().unwrap();
        let path = pid_path(&dir);
        let marker = dir.path().join("hup");
        let trap = format!("trap \"echo reload >> '{}'\" HUP", marker.display());
        let mut child = spawn_shell_daemon(&trap, &path);

        assert!(restart(&path).unwrap());
        let deadline = Instant::now() + Duration::from_secs(5);
        while !marker.exists() {
            assert!(Instant::now() < deadline, "HUP never handled");
            thread::sleep(Duration::from_millis(20));
        }
        assert!(path.exists());

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn restart_without_pid_file_reports_nothing_sent() {
        let dir = tempdir().unwrap();
        assert!(!restart(pid_path(&dir)).unwrap());
    }
}
