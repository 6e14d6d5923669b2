//! Irreversible identity change, performed once the daemon no longer needs
//! root (typically after binding a privileged port).

use crate::error::{DaemonError, DaemonResult};
use crate::sys::unix;
use crate::types::{Group, User};
use std::io;

/// A user resolved against the passwd database.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Account {
    name: Option<String>,
    uid: u32,
    primary_gid: Option<u32>,
}

fn resolve_account(user: &User) -> DaemonResult<Account> {
    match user {
        User::Name(name) => match unix::user_by_name(name)? {
            Some(entry) => Ok(Account {
                name: Some(entry.name),
                uid: entry.uid,
                primary_gid: Some(entry.gid),
            }),
            None => Err(DaemonError::UnknownUser(name.clone())),
        },
        // Numeric ids need no passwd entry.
        User::Id(uid) => Ok(match unix::user_by_id(*uid)? {
            Some(entry) => Account {
                name: Some(entry.name),
                uid: entry.uid,
                primary_gid: Some(entry.gid),
            },
            None => Account { name: None, uid: *uid, primary_gid: None },
        }),
    }
}

/// Resolves a user name (or numeric id) to a uid.
pub fn resolve_user(user: &User) -> DaemonResult<u32> {
    resolve_account(user).map(|account| account.uid)
}

/// Resolves a group name (or numeric id) to a gid.
pub fn resolve_group(group: &Group) -> DaemonResult<u32> {
    match group {
        Group::Name(name) => unix::group_by_name(name)?
            .map(|entry| entry.gid)
            .ok_or_else(|| DaemonError::UnknownGroup(name.clone())),
        Group::Id(gid) => Ok(*gid),
    }
}

fn identity_error(operation: &'static str, err: io::Error) -> DaemonError {
    match err.raw_os_error() {
        Some(libc::EPERM) => DaemonError::NotPermitted { operation, source: err },
        _ => DaemonError::Io(err),
    }
}

/// Switches the process to `user` and `group`, group first.
///
/// Both names are resolved before anything changes, so a lookup failure
/// leaves the process untouched. There is no way back.
pub fn change_privilege(user: &User, group: &Group) -> DaemonResult<()> {
    drop_privileges(Some(user), Some(group))
}

/// Like [`change_privilege`] but either side may be missing. With only a
/// user, the group becomes that user's primary group.
pub(crate) fn drop_privileges(user: Option<&User>, group: Option<&Group>) -> DaemonResult<()> {
    let account = user.map(resolve_account).transpose()?;
    let gid = match (group, &account) {
        (Some(group), _) => Some(resolve_group(group)?),
        (None, Some(account)) => match account.primary_gid {
            Some(gid) => Some(gid),
            None => return Err(DaemonError::NoPrimaryGroup { uid: account.uid }),
        },
        (None, None) => None,
    };

    tracing::info!(
        "Changing process privilege to {}:{}",
        user.map(ToString::to_string).unwrap_or_default(),
        group.map(ToString::to_string).unwrap_or_default()
    );

    if let Some(gid) = gid {
        // Supplementary groups can only be touched while still root.
        if unix::geteuid() == 0 {
            let groups = match account.as_ref().and_then(|a| a.name.as_deref()) {
                Some(name) => unix::initgroups(name, gid),
                None => unix::setgroups(&[gid]),
            };
            groups.map_err(|e| identity_error("setgroups", e))?;
        }
        unix::setgid(gid).map_err(|e| identity_error("setgid", e))?;
    }
    if let Some(account) = &account {
        unix::setuid(account.uid).map_err(|e| identity_error("setuid", e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_ids_resolve_without_lookup() {
        assert_eq!(resolve_user(&User::Id(4_000_123)).unwrap(), 4_000_123);
        assert_eq!(resolve_group(&Group::Id(4_000_123)).unwrap(), 4_000_123);
    }

    #[test]
    fn root_resolves_by_name() {
        let root = unix::user_by_id(0).unwrap().unwrap();
        assert_eq!(resolve_user(&User::Name(root.name)).unwrap(), 0);
    }

    #[test]
    fn unknown_user_fails_before_any_change() {
        let (uid, gid) = (unix::geteuid(), unix::getegid());
        let err = change_privilege(&User::from("no-such-user-dk"), &Group::Id(gid)).unwrap_err();
        assert!(matches!(err, DaemonError::UnknownUser(name) if name == "no-such-user-dk"));
        assert_eq!((unix::geteuid(), unix::getegid()), (uid, gid));
    }

    #[test]
    fn unknown_group_fails_before_any_change() {
        let (uid, gid) = (unix::geteuid(), unix::getegid());
        let err = change_privilege(&User::Id(uid), &Group::from("no-such-group-dk")).unwrap_err();
        assert!(matches!(err, DaemonError::UnknownGroup(_)));
        assert_eq!((unix::geteuid(), unix::getegid()), (uid, gid));
    }

    #[test]
    fn bare_uid_without_group_is_refused_before_any_change() {
        let (uid, gid) = (unix::geteuid(), unix::getegid());
        let err = drop_privileges(Some(&User::Id(4_000_123)), None).unwrap_err();
        assert!(matches!(err, DaemonError::NoPrimaryGroup { uid: 4_000_123 }));
        assert_eq!((unix::geteuid(), unix::getegid()), (uid, gid));
    }

    #[test]
    fn switching_to_own_identity_is_allowed() {
        let (uid, gid) = (unix::geteuid(), unix::getegid());
        change_privilege(&User::Id(uid), &Group::Id(gid)).unwrap();
        assert_eq!((unix::geteuid(), unix::getegid()), (uid, gid));
    }

    #[test]
    fn unprivileged_switch_to_root_is_not_permitted() {
        if unix::geteuid() == 0 {
            return;
        }
        let err = change_privilege(&User::Id(0), &Group::Id(0)).unwrap_err();
        assert!(matches!(err, DaemonError::NotPermitted { operation: "setgid", .. }));
    }
}
