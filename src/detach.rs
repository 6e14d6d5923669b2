//! The two ways of becoming a background process.
//!
//! - **Fork:** classic double fork. The invoking process exits, the child
//!   starts a new session (no controlling terminal, no SIGHUP from the
//!   shell), redirects the standard streams and forks once more so it can
//!   never reacquire a terminal.
//! - **Service manager:** systemd already runs us in the background. Stay
//!   in the foreground, redirect the streams and report `READY=1` once
//!   the pid file is in place.

use crate::daemon::fatal;
use crate::error::DaemonResult;
use crate::options::DetachMode;
use crate::stdio::StreamRedirector;
use crate::sys::unix::{self, Fork};
use sd_notify::NotifyState;

pub(crate) trait Detacher {
    /// Leaves the foreground. Errors returned from here happened before
    /// detaching; anything that fails afterwards ends the process.
    fn detach(&self, streams: &mut StreamRedirector) -> DaemonResult<()>;

    /// Called once the daemon is fully set up.
    fn notify_ready(&self) {}
}

struct ForkDetacher;

impl Detacher for ForkDetacher {
    fn detach(&self, streams: &mut StreamRedirector) -> DaemonResult<()> {
        if let Fork::Parent(child) = unix::fork()? {
            tracing::debug!("forked daemon candidate {}", child);
            std::process::exit(0);
        }

        if let Err(err) = unix::setsid().and_then(|()| streams.redirect()) {
            fatal(streams, &err);
        }

        match unix::fork() {
            Ok(Fork::Parent(_)) => unix::exit_immediately(0),
            Ok(Fork::Child) => Ok(()),
            Err(err) => fatal(streams, &err),
        }
    }
}

struct ServiceManagerDetacher;

impl Detacher for ServiceManagerDetacher {
    fn detach(&self, streams: &mut StreamRedirector) -> DaemonResult<()> {
        streams.redirect()
    }

    fn notify_ready(&self) {
        // `true` unsets NOTIFY_SOCKET so it doesn't leak to children.
        if let Err(err) = sd_notify::notify(true, &[NotifyState::Ready]) {
            tracing::warn!("Failed to notify service manager: {}", err);
        }
    }
}

fn under_service_manager() -> bool {
    cfg!(target_os = "linux") && std::env::var_os("NOTIFY_SOCKET").is_some()
}

pub(crate) fn detacher(mode: DetachMode) -> Box<dyn Detacher> {
    match mode {
        DetachMode::Fork => Box::new(ForkDetacher),
        DetachMode::Foreground => Box::new(ServiceManagerDetacher),
        DetachMode::Auto if under_service_manager() => Box::new(ServiceManagerDetacher),
        DetachMode::Auto => Box::new(ForkDetacher),
    }
}
