use crate::error::DaemonResult;
use libc::SIGKILL;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::fmt;
use std::os::raw::c_int;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// The signals the stop protocol and the daemon care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Graceful stop request (INT). What [`crate::kill`] sends.
    Interrupt,
    /// Graceful stop request (TERM), as sent by service managers.
    Terminate,
    /// Graceful stop request (QUIT).
    Quit,
    /// Restart / reload request (HUP).
    Hangup,
    /// Unconditional termination (KILL). Cannot be caught.
    Kill,
}

impl Signal {
    pub fn as_raw(self) -> c_int {
        match self {
            Signal::Interrupt => SIGINT,
            Signal::Terminate => SIGTERM,
            Signal::Quit => SIGQUIT,
            Signal::Hangup => SIGHUP,
            Signal::Kill => SIGKILL,
        }
    }

    pub fn from_raw(raw: c_int) -> Option<Self> {
        match raw {
            SIGINT => Some(Signal::Interrupt),
            SIGTERM => Some(Signal::Terminate),
            SIGQUIT => Some(Signal::Quit),
            SIGHUP => Some(Signal::Hangup),
            SIGKILL => Some(Signal::Kill),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Signal::Interrupt => "INT",
            Signal::Terminate => "TERM",
            Signal::Quit => "QUIT",
            Signal::Hangup => "HUP",
            Signal::Kill => "KILL",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flags the listener thread raises for the serving code.
#[derive(Debug, Clone, Default)]
pub(crate) struct ControlFlags {
    pub(crate) shutdown: Arc<AtomicBool>,
    pub(crate) reload: Arc<AtomicBool>,
}

/// Installs handlers for INT, TERM, QUIT and HUP and starts the thread
/// that reacts to them.
///
/// A graceful signal raises `shutdown`; with `exit_on_signal` the process
/// then exits normally (running the pid-file hook). A second graceful
/// signal always exits. HUP only raises `reload`.
pub(crate) fn listen(flags: ControlFlags, exit_on_signal: bool) -> DaemonResult<()> {
    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT, SIGHUP])?;

    thread::Builder::new()
        .name("daemon-signals".to_owned())
        .spawn(move || {
            for raw in signals.forever() {
                let Some(signal) = Signal::from_raw(raw) else {
                    continue;
                };
                if signal == Signal::Hangup {
                    tracing::info!("Received HUP, reload requested");
                    flags.reload.store(true, Ordering::SeqCst);
                    continue;
                }
                let repeated = flags.shutdown.swap(true, Ordering::SeqCst);
                if exit_on_signal || repeated {
                    tracing::info!("Received {}, exiting", signal);
                    std::process::exit(0);
                }
                tracing::info!("Received {}, shutdown requested", signal);
            }
        })?;
    Ok(())
}
