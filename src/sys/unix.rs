//! Thin wrappers over the raw `libc` calls used by the rest of the crate.
//!
//! Everything `unsafe` lives here; callers get `io::Result`/`DaemonResult`.

use crate::error::{DaemonError, DaemonResult};
use std::ffi::{CStr, CString};
use std::io;
use std::mem;
use std::os::raw::{c_char, c_int};
use std::os::unix::io::RawFd;
use std::ptr;

/// Largest buffer we grow to while retrying `getpwnam_r` & co. on ERANGE.
const MAX_LOOKUP_BUFFER: usize = 1 << 20;

/// Which side of a `fork(2)` we are on.
pub(crate) enum Fork {
    Parent(libc::pid_t),
    Child,
}

pub(crate) fn fork() -> DaemonResult<Fork> {
    // SAFETY: the child only performs async-signal-safe setup (setsid,
    // dup2, open) before it is allowed to run arbitrary code again.
    let pid = unsafe { libc::fork() };
    match pid {
        p if p < 0 => Err(DaemonError::last_syscall("fork")),
        0 => Ok(Fork::Child),
        p => Ok(Fork::Parent(p)),
    }
}

pub(crate) fn setsid() -> DaemonResult<()> {
    if unsafe { libc::setsid() } < 0 {
        return Err(DaemonError::last_syscall("setsid"));
    }
    Ok(())
}

/// Points `target_fd` at the same open file description as `source_fd`.
pub(crate) fn dup2(source_fd: RawFd, target_fd: RawFd) -> DaemonResult<()> {
    if unsafe { libc::dup2(source_fd, target_fd) } < 0 {
        return Err(DaemonError::last_syscall("dup2"));
    }
    Ok(())
}

pub(crate) fn umask(mask: u32) {
    unsafe { libc::umask(mask as libc::mode_t) };
}

/// Terminates the calling process without running exit hooks or flushing
/// stdio buffers inherited from the parent.
pub(crate) fn exit_immediately(code: c_int) -> ! {
    unsafe { libc::_exit(code) }
}

pub(crate) fn register_atexit(hook: extern "C" fn()) -> DaemonResult<()> {
    if unsafe { libc::atexit(hook) } != 0 {
        return Err(DaemonError::last_syscall("atexit"));
    }
    Ok(())
}

pub(crate) fn getpid() -> i32 {
    unsafe { libc::getpid() }
}

pub(crate) fn geteuid() -> u32 {
    unsafe { libc::geteuid() }
}

#[cfg(test)]
pub(crate) fn getegid() -> u32 {
    unsafe { libc::getegid() }
}

/// Delivers `signal` to `pid`. Signal 0 only probes for existence.
pub(crate) fn kill(pid: i32, signal: c_int) -> io::Result<()> {
    if unsafe { libc::kill(pid, signal) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// A process we may not signal (EPERM) still exists.
pub(crate) fn process_alive(pid: i32) -> bool {
    match kill(pid, 0) {
        Ok(()) => true,
        Err(err) => err.raw_os_error() == Some(libc::EPERM),
    }
}

pub(crate) fn setgid(gid: u32) -> io::Result<()> {
    if unsafe { libc::setgid(gid as libc::gid_t) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn setuid(uid: u32) -> io::Result<()> {
    if unsafe { libc::setuid(uid as libc::uid_t) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn setgroups(gids: &[u32]) -> io::Result<()> {
    let gids: Vec<libc::gid_t> = gids.iter().map(|g| *g as libc::gid_t).collect();
    #[cfg(any(target_os = "linux", target_os = "android"))]
    let len = gids.len() as libc::size_t;
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    let len = gids.len() as c_int;
    if unsafe { libc::setgroups(len, gids.as_ptr()) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

pub(crate) fn initgroups(user: &str, gid: u32) -> io::Result<()> {
    let name = CString::new(user)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "user name contains NUL"))?;
    #[cfg(target_vendor = "apple")]
    let gid = gid as c_int;
    #[cfg(not(target_vendor = "apple"))]
    let gid = gid as libc::gid_t;
    if unsafe { libc::initgroups(name.as_ptr(), gid) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

// =========================================================================
// User / group database
// =========================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PasswdEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct GroupEntry {
    pub gid: u32,
}

/// Some libcs report "no such entry" through the return code instead of a
/// null result pointer.
fn is_missing_entry(rc: c_int) -> bool {
    matches!(rc, libc::ENOENT | libc::ESRCH | libc::EBADF | libc::EPERM)
}

fn with_lookup_buffer<T>(
    mut lookup: impl FnMut(&mut [c_char]) -> Result<Option<T>, c_int>,
) -> io::Result<Option<T>> {
    let mut buf: Vec<c_char> = vec![0; 1024];
    loop {
        match lookup(buf.as_mut_slice()) {
            Ok(found) => return Ok(found),
            Err(libc::ERANGE) if buf.len() < MAX_LOOKUP_BUFFER => {
                let grown = buf.len() * 2;
                buf.resize(grown, 0);
            }
            Err(rc) if is_missing_entry(rc) => return Ok(None),
            Err(rc) => return Err(io::Error::from_raw_os_error(rc)),
        }
    }
}

unsafe fn passwd_entry(pwd: &libc::passwd) -> PasswdEntry {
    PasswdEntry {
        name: unsafe { CStr::from_ptr(pwd.pw_name) }.to_string_lossy().into_owned(),
        uid: pwd.pw_uid,
        gid: pwd.pw_gid,
    }
}

fn group_entry(grp: &libc::group) -> GroupEntry {
    GroupEntry { gid: grp.gr_gid }
}

pub(crate) fn user_by_name(name: &str) -> io::Result<Option<PasswdEntry>> {
    let Ok(cname) = CString::new(name) else {
        return Ok(None);
    };
    with_lookup_buffer(|buf| {
        let mut pwd: libc::passwd = unsafe { mem::zeroed() };
        let mut result: *mut libc::passwd = ptr::null_mut();
        let rc = unsafe {
            libc::getpwnam_r(cname.as_ptr(), &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        match rc {
            0 if result.is_null() => Ok(None),
            0 => Ok(Some(unsafe { passwd_entry(&pwd) })),
            rc => Err(rc),
        }
    })
}

pub(crate) fn user_by_id(uid: u32) -> io::Result<Option<PasswdEntry>> {
    with_lookup_buffer(|buf| {
        let mut pwd: libc::passwd = unsafe { mem::zeroed() };
        let mut result: *mut libc::passwd = ptr::null_mut();
        let rc = unsafe {
            libc::getpwuid_r(uid as libc::uid_t, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        match rc {
            0 if result.is_null() => Ok(None),
            0 => Ok(Some(unsafe { passwd_entry(&pwd) })),
            rc => Err(rc),
        }
    })
}

pub(crate) fn group_by_name(name: &str) -> io::Result<Option<GroupEntry>> {
    let Ok(cname) = CString::new(name) else {
        return Ok(None);
    };
    with_lookup_buffer(|buf| {
        let mut grp: libc::group = unsafe { mem::zeroed() };
        let mut result: *mut libc::group = ptr::null_mut();
        let rc = unsafe {
            libc::getgrnam_r(cname.as_ptr(), &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
        };
        match rc {
            0 if result.is_null() => Ok(None),
            0 => Ok(Some(group_entry(&grp))),
            rc => Err(rc),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_pid_is_alive() {
        assert!(process_alive(getpid()));
    }

    #[test]
    fn root_is_in_the_user_database() {
        let root = user_by_id(0).unwrap().expect("uid 0 has a passwd entry");
        assert_eq!(root.uid, 0);
        assert_eq!(user_by_name(&root.name).unwrap(), Some(root));
    }

    #[test]
    fn missing_names_resolve_to_none() {
        assert_eq!(user_by_name("no-such-user-dk").unwrap(), None);
        assert_eq!(group_by_name("no-such-group-dk").unwrap(), None);
        assert_eq!(user_by_name("bad\0name").unwrap(), None);
    }
}
