use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Error type for every daemon_keeper operation.
///
/// Errors raised before the process detaches are returned to the caller.
/// Once detached, fatal errors are written to the redirected stderr and the
/// daemon exits with status 1 (see `Daemonizer::daemonize`).
#[derive(Debug, Error)]
pub enum DaemonError {
    /// Standard IO errors (log file, pid file, /dev/null).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A system call (fork, setsid, dup2...) failed.
    #[error("syscall '{call}' failed with errno {errno}")]
    Syscall { call: &'static str, errno: i32 },

    /// The pid file is absent or does not hold a usable pid.
    #[error("no pid found in {}", path.display())]
    PidNotFound { path: PathBuf },

    /// Another live process already owns the pid file.
    #[error("daemon is already running with pid {pid} (pid file {})", path.display())]
    AlreadyRunning { pid: i32, path: PathBuf },

    #[error("unknown user '{0}'")]
    UnknownUser(String),

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    /// A bare uid with no passwd entry and no group given: there is no
    /// group to switch to.
    #[error("no primary group for uid {uid}, a group must be given")]
    NoPrimaryGroup { uid: u32 },

    /// The caller lacks the rights for an identity change or signal delivery.
    #[error("{operation} not permitted: {source}")]
    NotPermitted {
        operation: &'static str,
        #[source]
        source: io::Error,
    },
}

impl DaemonError {
    /// True for the benign "nothing there to act on" conditions.
    pub fn is_not_found(&self) -> bool {
        match self {
            DaemonError::PidNotFound { .. } => true,
            DaemonError::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    pub(crate) fn last_syscall(call: &'static str) -> Self {
        DaemonError::Syscall {
            call,
            errno: io::Error::last_os_error().raw_os_error().unwrap_or(0),
        }
    }
}

/// A specialized Result type for daemon_keeper operations.
pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_classification() {
        let missing = DaemonError::PidNotFound { path: PathBuf::from("x.pid") };
        assert!(missing.is_not_found());
        assert!(DaemonError::Io(io::Error::from(io::ErrorKind::NotFound)).is_not_found());
        assert!(!DaemonError::UnknownUser("ghost".into()).is_not_found());
    }

    #[test]
    fn messages_name_the_pid_file() {
        let err = DaemonError::AlreadyRunning { pid: 42, path: PathBuf::from("/run/s.pid") };
        assert_eq!(
            err.to_string(),
            "daemon is already running with pid 42 (pid file /run/s.pid)"
        );
    }
}
