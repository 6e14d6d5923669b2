use crate::detach::detacher;
use crate::error::{DaemonError, DaemonResult};
use crate::exit_hook;
use crate::options::{DaemonOptions, DetachMode};
use crate::pid_file::PidFile;
use crate::privilege;
use crate::signals::{self, ControlFlags};
use crate::stdio::StreamRedirector;
use crate::sys::unix;
use crate::types::{Group, User};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const DEFAULT_UMASK: u32 = 0o027;

/// Configures and performs daemonization.
///
/// ```no_run
/// use daemon_keeper::Daemonizer;
///
/// let daemon = Daemonizer::new()
///     .pid_file("tmp/pids/server.pid")
///     .log_file("log/server.log")
///     .daemonize()?;
/// // Only the daemon gets here; the invoking process has exited.
/// while !daemon.shutdown_requested() {
///     // serve
/// #   break;
/// }
/// # Ok::<(), daemon_keeper::DaemonError>(())
/// ```
#[derive(Debug)]
pub struct Daemonizer {
    pid_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
    directory: Option<PathBuf>,
    umask: Option<u32>,
    user: Option<User>,
    group: Option<Group>,
    chown_pid: bool,
    detach: DetachMode,
    exit_on_signal: bool,
}

impl Default for Daemonizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemonizer {
    /// Creates a new default configuration.
    ///
    /// # Defaults
    /// - No pid file, output to `/dev/null`
    /// - Working directory: the current one
    /// - Umask: `0o027`
    /// - Exit on the first INT/TERM/QUIT
    pub fn new() -> Self {
        Daemonizer {
            pid_file: None,
            log_file: None,
            directory: None,
            umask: Some(DEFAULT_UMASK),
            user: None,
            group: None,
            chown_pid: false,
            detach: DetachMode::Auto,
            exit_on_signal: true,
        }
    }

    pub fn from_options(options: &DaemonOptions) -> Self {
        let mut daemonizer = Daemonizer::new().detach_mode(options.detach);
        daemonizer.set_pid_file(options.pid_file.clone());
        daemonizer.set_log_file(options.log_file.clone());
        daemonizer.directory = options.working_directory.clone();
        if let Some(mask) = options.umask {
            daemonizer.umask = Some(mask);
        }
        daemonizer.user = options.user.as_deref().map(User::from);
        daemonizer.group = options.group.as_deref().map(Group::from);
        daemonizer.chown_pid = options.chown_pid_file;
        daemonizer
    }

    // --- Public Getters ---

    /// Returns the configured pid file path, if any.
    pub fn pid_file_path(&self) -> Option<&Path> {
        self.pid_file.as_deref()
    }

    /// Returns the configured log file path, if any.
    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }

    pub fn working_directory_path(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    // --- Setters ---

    /// `None` disables pid tracking.
    pub fn set_pid_file(&mut self, path: Option<PathBuf>) {
        self.pid_file = path;
    }

    /// `None` sends stdout and stderr to `/dev/null`.
    pub fn set_log_file(&mut self, path: Option<PathBuf>) {
        self.log_file = path;
    }

    // --- Builder Methods ---

    pub fn pid_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.pid_file = Some(path.into());
        self
    }

    pub fn log_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.log_file = Some(path.into());
        self
    }

    /// Directory the daemon changes into after detaching.
    pub fn working_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.directory = Some(path.into());
        self
    }

    pub fn umask(mut self, mask: u32) -> Self {
        self.umask = Some(mask);
        self
    }

    /// User to switch to in [`Daemon::drop_privileges`].
    pub fn user<U: Into<User>>(mut self, user: U) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Group to switch to in [`Daemon::drop_privileges`].
    pub fn group<G: Into<Group>>(mut self, group: G) -> Self {
        self.group = Some(group.into());
        self
    }

    /// If true, the pid file is handed to the target user/group before
    /// privileges are dropped.
    pub fn chown_pid_file(mut self, chown: bool) -> Self {
        self.chown_pid = chown;
        self
    }

    pub fn detach_mode(mut self, mode: DetachMode) -> Self {
        self.detach = mode;
        self
    }

    /// With `false`, a graceful signal only raises
    /// [`Daemon::shutdown_requested`] and the serving code is expected to
    /// return. A second signal still exits.
    pub fn exit_on_signal(mut self, exit: bool) -> Self {
        self.exit_on_signal = exit;
        self
    }

    /// Turns the calling process into the daemon.
    ///
    /// Returns only in the daemon. Errors returned here happened before
    /// detaching (stale-pid check, log file, first fork). Failures after
    /// that are written to the log file and end the process with status 1.
    ///
    /// Must be called before any other thread is started.
    pub fn daemonize(self) -> DaemonResult<Daemon> {
        // Resolve against the invoking directory before anything moves.
        let cwd = std::env::current_dir()?;
        let pid_file = self.pid_file.as_ref().map(|p| PidFile::new(cwd.join(p)));
        let log_file = self.log_file.as_ref().map(|p| cwd.join(p));
        let directory = self.directory.as_ref().map_or_else(|| cwd.clone(), |d| cwd.join(d));

        if let Some(pid_file) = &pid_file {
            pid_file.remove_stale()?;
        }
        let mut streams = StreamRedirector::log_file(log_file.as_deref())?;

        let detacher = detacher(self.detach);
        detacher.detach(&mut streams)?;

        let flags = ControlFlags::default();
        if let Err(err) = self.settle(pid_file.as_ref(), &directory, &flags) {
            fatal(&mut streams, &err);
        }
        detacher.notify_ready();
        tracing::info!("Daemon running with pid {}", unix::getpid());

        Ok(Daemon {
            pid_file,
            streams,
            flags,
            user: self.user,
            group: self.group,
            chown_pid: self.chown_pid,
        })
    }

    /// Daemonizes, drops privileges if a user or group is configured, then
    /// hands control to `serve`.
    pub fn run<T, F>(self, serve: F) -> DaemonResult<T>
    where
        F: FnOnce(&Daemon) -> DaemonResult<T>,
    {
        let mut daemon = self.daemonize()?;
        if let Err(err) = daemon.drop_privileges() {
            fatal(&mut daemon.streams, &err);
        }
        serve(&daemon)
    }

    /// Post-detach setup. Handlers and the exit hook go in before the pid
    /// file appears so that a stop request can never hit the default INT
    /// action or exit without removing the file.
    fn settle(&self, pid_file: Option<&PidFile>, directory: &Path, flags: &ControlFlags) -> DaemonResult<()> {
        if let Some(mask) = self.umask {
            unix::umask(mask);
        }
        std::env::set_current_dir(directory)?;
        signals::listen(flags.clone(), self.exit_on_signal)?;

        if let Some(pid_file) = pid_file {
            publish_pid(pid_file)?;
        }
        Ok(())
    }
}

/// Writes our pid, with the exit hook already armed: there is no window
/// in which the file exists but would survive a normal exit.
fn publish_pid(pid_file: &PidFile) -> DaemonResult<()> {
    exit_hook::delete_on_exit(pid_file.clone())?;
    pid_file.write_current()
}

/// Reports a fatal error in an already detached daemon and exits.
pub(crate) fn fatal(streams: &mut StreamRedirector, err: &DaemonError) -> ! {
    let line = format!("[daemon_keeper critical] {err}");
    tracing::error!("{}", line);
    if let Some(log) = streams.error_log() {
        let _ = writeln!(log, "{line}");
        let _ = log.sync_all();
    }
    std::process::exit(1);
}

/// Handle held by the daemonized process.
#[derive(Debug)]
pub struct Daemon {
    pid_file: Option<PidFile>,
    streams: StreamRedirector,
    flags: ControlFlags,
    user: Option<User>,
    group: Option<Group>,
    chown_pid: bool,
}

impl Daemon {
    pub fn pid(&self) -> i32 {
        unix::getpid()
    }

    pub fn pid_file(&self) -> Option<&PidFile> {
        self.pid_file.as_ref()
    }

    /// True once INT, TERM or QUIT has been received.
    pub fn shutdown_requested(&self) -> bool {
        self.flags.shutdown.load(Ordering::SeqCst)
    }

    /// The flag behind [`Daemon::shutdown_requested`], for worker threads.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flags.shutdown)
    }

    /// True if HUP arrived since the last call.
    pub fn take_reload_request(&self) -> bool {
        self.flags.reload.swap(false, Ordering::SeqCst)
    }

    /// Switches to `user` and `group`. See [`privilege::change_privilege`].
    pub fn change_privilege(&self, user: &User, group: &Group) -> DaemonResult<()> {
        privilege::change_privilege(user, group)
    }

    /// Applies the configured user/group, if any, chowning the pid file
    /// first when asked to.
    pub fn drop_privileges(&self) -> DaemonResult<()> {
        if self.user.is_none() && self.group.is_none() {
            return Ok(());
        }
        if self.chown_pid {
            if let Some(pid_file) = &self.pid_file {
                let uid = self.user.as_ref().map(privilege::resolve_user).transpose()?;
                let gid = self.group.as_ref().map(privilege::resolve_group).transpose()?;
                std::os::unix::fs::chown(pid_file.path(), uid, gid)?;
            }
        }
        privilege::drop_privileges(self.user.as_ref(), self.group.as_ref())
    }
}
