use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How the process leaves the foreground.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetachMode {
    /// Foreground when started by systemd with a notify socket, fork otherwise.
    #[default]
    Auto,
    /// Classic double fork with a new session in between.
    Fork,
    /// Stay attached to the service manager and report readiness to it.
    Foreground,
}

const fn default_stop_timeout_secs() -> u64 {
    30
}

/// Daemon settings as they appear in a host's configuration file,
/// e.g. a `[daemon]` table in TOML.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonOptions {
    /// No pid file means the daemon cannot be stopped through [`crate::kill`].
    pub pid_file: Option<PathBuf>,
    /// No log file means stdout/stderr go to `/dev/null`.
    pub log_file: Option<PathBuf>,
    pub user: Option<String>,
    pub group: Option<String>,
    pub working_directory: Option<PathBuf>,
    pub umask: Option<u32>,
    pub chown_pid_file: bool,
    pub detach: DetachMode,
    #[serde(default = "default_stop_timeout_secs")]
    pub stop_timeout_secs: u64,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        DaemonOptions {
            pid_file: None,
            log_file: None,
            user: None,
            group: None,
            working_directory: None,
            umask: None,
            chown_pid_file: false,
            detach: DetachMode::Auto,
            stop_timeout_secs: default_stop_timeout_secs(),
        }
    }
}

impl DaemonOptions {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}
