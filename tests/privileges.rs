// tests/privileges.rs
#![cfg(unix)]

use daemon_keeper::{DaemonError, Group, User, change_privilege};
use serial_test::serial;

const NOBODY: u32 = 65534;

fn in_child(body: impl FnOnce() -> bool) -> bool {
    match unsafe { libc::fork() } {
        -1 => panic!("fork failed"),
        0 => {
            let ok = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)).unwrap_or(false);
            unsafe { libc::_exit(if ok { 0 } else { 1 }) }
        }
        pid => {
            let mut status = 0;
            assert_eq!(unsafe { libc::waitpid(pid, &mut status, 0) }, pid);
            libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0
        }
    }
}

#[test]
#[serial]
#[ignore = "requires root privileges"]
fn drop_changes_ids() {
    assert!(in_child(|| {
        change_privilege(&User::Id(NOBODY), &Group::Id(NOBODY)).is_ok()
            && unsafe { libc::geteuid() } == NOBODY
            && unsafe { libc::getegid() } == NOBODY
            && unsafe { libc::getuid() } == NOBODY
    }));
}

#[test]
#[serial]
#[ignore = "requires root privileges"]
fn drop_is_irreversible() {
    assert!(in_child(|| {
        change_privilege(&User::Id(NOBODY), &Group::Id(NOBODY)).unwrap();
        matches!(
            change_privilege(&User::Id(0), &Group::Id(0)),
            Err(DaemonError::NotPermitted { .. })
        )
    }));
}

#[test]
#[serial]
fn unknown_names_leave_identity_untouched() {
    assert!(in_child(|| {
        let before = unsafe { (libc::geteuid(), libc::getegid()) };
        let err = change_privilege(&User::from("no-such-user-dk"), &Group::from("no-such-group-dk"));
        let after = unsafe { (libc::geteuid(), libc::getegid()) };
        matches!(err, Err(DaemonError::UnknownUser(_))) && before == after
    }));
}
