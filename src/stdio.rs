use crate::error::DaemonResult;
use crate::sys::unix;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;

const DEV_NULL: &str = "/dev/null";

/// Defines where one of the standard streams (stdin, stdout, stderr) goes.
#[derive(Debug)]
pub(crate) enum Stdio {
    /// Redirects the stream to `/dev/null`. Default option.
    Devnull,
    /// Redirects the stream to the specified file.
    RedirectToFile(File),
}

impl Stdio {
    /// Creates a configuration that discards all output.
    pub(crate) fn devnull() -> Self {
        Stdio::Devnull
    }

    /// Opens `path` for appending, creating it if needed.
    pub(crate) fn append<P: AsRef<Path>>(path: P) -> DaemonResult<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Stdio::RedirectToFile(file))
    }

    fn try_clone(&self) -> DaemonResult<Self> {
        Ok(match self {
            Stdio::Devnull => Stdio::Devnull,
            Stdio::RedirectToFile(f) => Stdio::RedirectToFile(f.try_clone()?),
        })
    }

    fn redirect_onto(&self, target_fd: RawFd) -> DaemonResult<()> {
        match self {
            Stdio::RedirectToFile(f) => unix::dup2(f.as_raw_fd(), target_fd),
            Stdio::Devnull => {
                let null = OpenOptions::new().read(true).write(true).open(DEV_NULL)?;
                unix::dup2(null.as_raw_fd(), target_fd)
            }
        }
    }
}

/// Rebinds the process-wide standard streams at the file-descriptor level.
///
/// Because the descriptors themselves are replaced, anything writing to
/// fd 1 or 2 (`println!`, C libraries, child processes) lands in the target.
#[derive(Debug)]
pub struct StreamRedirector {
    stdin: Stdio,
    stdout: Stdio,
    stderr: Stdio,
}

impl StreamRedirector {
    /// stdout and stderr appended to `log_file`, or discarded when `None`.
    /// stdin always reads from `/dev/null`.
    ///
    /// The file is opened right away so that a bad path is reported before
    /// the caller detaches.
    pub fn log_file(log_file: Option<&Path>) -> DaemonResult<Self> {
        let stdout = match log_file {
            Some(path) => Stdio::append(path)?,
            None => Stdio::devnull(),
        };
        let stderr = stdout.try_clone()?;
        Ok(StreamRedirector { stdin: Stdio::devnull(), stdout, stderr })
    }

    /// Performs the redirection. Whatever is still buffered in Rust's
    /// stdout/stderr handles is flushed to the old target first.
    pub fn redirect(&self) -> DaemonResult<()> {
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        self.stdin.redirect_onto(libc::STDIN_FILENO)?;
        self.stdout.redirect_onto(libc::STDOUT_FILENO)?;
        self.stderr.redirect_onto(libc::STDERR_FILENO)?;
        tracing::debug!("standard streams redirected");
        Ok(())
    }

    /// The file stderr is being sent to, if any.
    pub(crate) fn error_log(&mut self) -> Option<&mut File> {
        if let Stdio::RedirectToFile(f) = &mut self.stderr {
            return Some(f);
        }
        if let Stdio::RedirectToFile(f) = &mut self.stdout {
            return Some(f);
        }
        None
    }
}

/// Sends stdout and stderr to `log_file` (or `/dev/null`) and stdin to
/// `/dev/null`.
pub fn redirect(log_file: Option<&Path>) -> DaemonResult<()> {
    StreamRedirector::log_file(log_file)?.redirect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn log_file_shares_one_file_between_stdout_and_stderr() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.log");
        let mut redirector = StreamRedirector::log_file(Some(&path)).unwrap();
        assert!(matches!(redirector.stdin, Stdio::Devnull));

        writeln!(redirector.error_log().unwrap(), "first").unwrap();
        if let Stdio::RedirectToFile(f) = &mut redirector.stdout {
            writeln!(f, "second").unwrap();
        }

        let mut contents = String::new();
        File::open(&path).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn log_file_appends() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("d.log");
        std::fs::write(&path, "old\n").unwrap();
        let mut redirector = StreamRedirector::log_file(Some(&path)).unwrap();
        writeln!(redirector.error_log().unwrap(), "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "old\nnew\n");
    }

    #[test]
    fn no_log_file_means_devnull() {
        let mut redirector = StreamRedirector::log_file(None).unwrap();
        assert!(matches!(redirector.stdout, Stdio::Devnull));
        assert!(redirector.error_log().is_none());
    }

    #[test]
    fn unopenable_log_file_is_reported_up_front() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("d.log");
        assert!(StreamRedirector::log_file(Some(&path)).is_err());
    }
}
