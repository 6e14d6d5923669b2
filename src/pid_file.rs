use crate::error::{DaemonError, DaemonResult};
use crate::sys::unix;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A file holding the decimal pid of a running daemon.
///
/// Nothing is cached: every call goes to disk, so the file is the single
/// source of truth shared between the daemon and whoever wants to stop it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        PidFile { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `pid` in decimal, replacing any previous file.
    ///
    /// The contents go to a sibling temp file that is renamed into place,
    /// so a concurrent reader sees either the old pid or the new one.
    pub fn write(&self, pid: i32) -> DaemonResult<()> {
        tracing::info!("Writing PID {} to {}", pid, self.path.display());
        let tmp = self.temp_path();
        if let Err(err) = fs::write(&tmp, format!("{pid}\n")).and_then(|()| fs::rename(&tmp, &self.path)) {
            let _ = fs::remove_file(&tmp);
            return Err(err.into());
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let name = self.path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        self.path.with_file_name(format!(".{name}.{}.tmp", unix::getpid()))
    }

    /// Writes the pid of the calling process.
    pub fn write_current(&self) -> DaemonResult<()> {
        self.write(unix::getpid())
    }

    /// Parses the recorded pid.
    ///
    /// An absent file, garbage, or a pid that would address a process group
    /// (zero or negative) all yield [`DaemonError::PidNotFound`].
    pub fn read(&self) -> DaemonResult<i32> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(self.not_found()),
            Err(err) => return Err(err.into()),
        };
        let pid = std::str::from_utf8(&bytes).ok().and_then(|s| s.trim().parse::<i32>().ok());
        match pid {
            Some(pid) if pid > 0 => Ok(pid),
            _ => {
                tracing::warn!("Ignoring unparsable pid file {}", self.path.display());
                Err(self.not_found())
            }
        }
    }

    /// Removes the file. Removing a file that is not there is fine.
    pub fn delete(&self) -> DaemonResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!("Deleted PID file {}", self.path.display());
                Ok(())
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// True when the file names a process that is still alive.
    pub fn is_running(&self) -> bool {
        self.read().map(unix::process_alive).unwrap_or(false)
    }

    /// Clears a pid file left behind by a dead process.
    ///
    /// Fails with [`DaemonError::AlreadyRunning`] if the recorded process
    /// is still alive.
    pub fn remove_stale(&self) -> DaemonResult<()> {
        if !self.exists() {
            return Ok(());
        }
        match self.read() {
            Ok(pid) if unix::process_alive(pid) => Err(DaemonError::AlreadyRunning {
                pid,
                path: self.path.clone(),
            }),
            Ok(_) | Err(DaemonError::PidNotFound { .. }) => {
                tracing::warn!("Deleting stale PID file {}", self.path.display());
                self.delete()
            }
            Err(err) => Err(err),
        }
    }

    fn not_found(&self) -> DaemonError {
        DaemonError::PidNotFound { path: self.path.clone() }
    }
}
