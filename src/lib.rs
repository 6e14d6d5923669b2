//! # daemon_keeper
//!
//! Process-lifecycle control for a long-running server: detach it into the
//! background, record its pid in a pid file, send its standard streams to a
//! log file, drop root once privileged resources are bound, and stop it
//! later from a separate invocation that only knows the pid file.
//!
//! ```no_run
//! use daemon_keeper::{Daemonizer, DaemonResult};
//! use std::time::Duration;
//!
//! fn start() -> DaemonResult<()> {
//!     Daemonizer::new()
//!         .pid_file("tmp/pids/server.pid")
//!         .log_file("log/server.log")
//!         .user("www-data")
//!         .run(|daemon| {
//!             while !daemon.shutdown_requested() {
//!                 std::thread::sleep(Duration::from_millis(100));
//!             }
//!             Ok(())
//!         })
//! }
//!
//! fn stop() -> DaemonResult<()> {
//!     daemon_keeper::kill("tmp/pids/server.pid", Duration::from_secs(30))?;
//!     Ok(())
//! }
//! # let _ = (start, stop);
//! ```
//!
//! Only one daemon may use a given pid file at a time. Two processes racing
//! on the same path both believe they own it and the last writer wins.

#[cfg(not(unix))]
compile_error!("daemon_keeper relies on fork(2) and POSIX signals and only supports Unix targets");

mod daemon;
mod detach;
mod error;
mod exit_hook;
mod options;
mod pid_file;
mod privilege;
mod shutdown;
mod signals;
mod stdio;
mod sys;
mod types;

// Re-export public types to keep the API flat
pub use daemon::{Daemon, Daemonizer};
pub use error::{DaemonError, DaemonResult};
pub use options::{DaemonOptions, DetachMode};
pub use pid_file::PidFile;
pub use privilege::{change_privilege, resolve_group, resolve_user};
pub use shutdown::{POLL_INTERVAL, StopOutcome, kill, restart, send_signal};
pub use signals::Signal;
pub use stdio::{StreamRedirector, redirect};
pub use types::{Group, User};
