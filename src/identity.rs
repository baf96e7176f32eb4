//! Operator identity and local group authorization.
//!
//! The holder record names the operator by login name. Authorization is plain
//! local group membership: primary gid, supplementary gids, or an explicit
//! member entry in the group database.

use crate::error::{OpgateError, Result};
use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::{Gid, Group, Pid, User, getgid, getgroups, getuid};

/// Placeholder used whenever a name cannot be determined.
pub const UNKNOWN: &str = "unknown";

/// Login name of the real user running this process.
///
/// Uses the passwd entry for the real uid, then `$USER` / `$USERNAME`.
pub fn current_username() -> String {
    if let Ok(Some(user)) = User::from_uid(getuid()) {
        return user.name;
    }
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

/// Short hostname of this machine.
pub fn current_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| UNKNOWN.to_string())
}

/// Whether the current process belongs to `group_name`.
///
/// An unknown group is treated as "not a member".
pub fn is_member_of_group(group_name: &str) -> bool {
    let group = match Group::from_name(group_name) {
        Ok(Some(group)) => group,
        Ok(None) => return false,
        Err(e) => {
            tracing::warn!(group = group_name, error = %e, "group lookup failed");
            return false;
        }
    };

    if group.gid == getgid() {
        return true;
    }
    let supplementary: Vec<Gid> = getgroups().unwrap_or_default();
    if supplementary.contains(&group.gid) {
        return true;
    }
    let user = current_username();
    group.mem.iter().any(|member| *member == user)
}

/// Fail with `NotAuthorized` unless the current user is in `group_name`.
pub fn require_group(group_name: &str) -> Result<()> {
    if is_member_of_group(group_name) {
        tracing::debug!(group = group_name, "group membership confirmed");
        Ok(())
    } else {
        Err(OpgateError::NotAuthorized {
            user: current_username(),
            group: group_name.to_string(),
        })
    }
}

/// Whether a process with this pid exists on the local host.
///
/// `EPERM` means the process exists but belongs to someone else.
pub fn process_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    if raw <= 0 {
        return false;
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) => true,
        Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}
