use nix::unistd::{getegid, geteuid, getgroups, setegid, seteuid, setgroups, Gid, Uid};

use crate::common::{Result, SessionError};
use crate::session::Account;

/// Switches the effective identity of the process to an account and restores the previous
/// identity when dropped.
///
/// Supplementary groups are only changed when the process is privileged.
pub struct IdentityGuard {
    euid: Uid,
    egid: Gid,
    groups: Option<Vec<Gid>>,
}

impl IdentityGuard {
    pub fn switch_to(account: &Account) -> Result<IdentityGuard> {
        let euid = geteuid();
        let egid = getegid();
        let groups = if euid.is_root() { Some(getgroups()?) } else { None };

        // Restores whatever was already changed if a later step fails.
        let guard = IdentityGuard { euid, egid, groups };

        let uid = Uid::from_raw(account.uid());
        let gid = Gid::from_raw(account.gid());
        if uid == euid && gid == egid {
            return Ok(guard);
        }

        if guard.groups.is_some() {
            let account_groups: Vec<Gid> = account.groups().iter().map(|&group| Gid::from_raw(group)).collect();
            setgroups(&account_groups)
                .map_err(|errno| SessionError::system(errno as i32, format!("Cant set groups of {}", account.username())))?;
        }

        setegid(gid).map_err(|errno| SessionError::system(errno as i32, format!("Cant set effective gid {}", gid)))?;
        seteuid(uid).map_err(|errno| SessionError::system(errno as i32, format!("Cant set effective uid {}", uid)))?;

        debug!("Effective identity switched to {} ({}:{})", account.username(), uid, gid);
        Ok(guard)
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        // The uid first, regaining the privileges needed for the rest.
        if geteuid() != self.euid {
            if let Err(errno) = seteuid(self.euid) {
                error!("Cant restore effective uid {}: {}", self.euid, errno);
            }
        }

        if getegid() != self.egid {
            if let Err(errno) = setegid(self.egid) {
                error!("Cant restore effective gid {}: {}", self.egid, errno);
            }
        }

        if let Some(groups) = &self.groups {
            if let Err(errno) = setgroups(groups) {
                error!("Cant restore supplementary groups: {}", errno);
            }
        }
    }
}
