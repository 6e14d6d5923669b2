//! Process-level cleanup of the pid file on normal termination.
//!
//! The hook is an `atexit(3)` registration, not a `Drop` impl: it must fire
//! whichever code path ends the process (`return` from `main`,
//! `std::process::exit`, or the signal listener calling `exit`).

use crate::error::DaemonResult;
use crate::pid_file::PidFile;
use crate::sys::unix;
use std::sync::{Mutex, Once};

static PENDING: Mutex<Option<PidFile>> = Mutex::new(None);
static REGISTER: Once = Once::new();

extern "C" fn remove_pid_file_at_exit() {
    let pid_file = match PENDING.lock() {
        Ok(mut pending) => pending.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(pid_file) = pid_file {
        let _ = pid_file.delete();
    }
}

/// Arranges for `pid_file` to be deleted when the process exits normally.
///
/// Registering again replaces the path; the hook itself is installed once
/// and deletes at most one file.
pub(crate) fn delete_on_exit(pid_file: PidFile) -> DaemonResult<()> {
    let mut registered = Ok(());
    REGISTER.call_once(|| registered = unix::register_atexit(remove_pid_file_at_exit));
    registered?;

    match PENDING.lock() {
        Ok(mut pending) => *pending = Some(pid_file),
        Err(poisoned) => *poisoned.into_inner() = Some(pid_file),
    }
    Ok(())
}

/// Runs the hook now, as exit would.
#[cfg(test)]
pub(crate) fn run_now() {
    remove_pid_file_at_exit();
}
