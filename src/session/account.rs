use std::fmt;

use nix::unistd::{Uid, User};
use users::get_user_groups;

use crate::common::{Result, SessionError};

/// The `Account` struct represents the user account that owns a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    username: String,
    home: String,
    uid: u32,
    gid: u32,
    groups: Vec<u32>
}

impl Account {
    /// Creates a new `Account` instance.
    ///
    /// # Arguments
    /// * `username` - The username of the account.
    /// * `home` - The home directory of the account.
    /// * `uid` - The user ID of the account.
    /// * `gid` - The primary group ID of the account.
    /// * `groups` - The supplementary group IDs of the account.
    pub fn new(username: &str, home: &str, uid: u32, gid: u32, groups: Vec<u32>) -> Self {
        Account {
            username: username.into(),
            home: home.into(),
            uid,
            gid,
            groups
        }
    }

    /// Looks up an account in the system's account database.
    ///
    /// # Returns
    /// `Ok(None)` when no entry exists for the uid, an `AccountError` when the database query itself fails.
    pub fn from_uid(uid: u32) -> Result<Option<Account>> {
        match User::from_uid(Uid::from_raw(uid)) {
            Ok(Some(user)) => Ok(Some(Account::from_user(user))),
            Ok(None) => Ok(None),
            Err(errno) => Err(SessionError::AccountError(format!("Cant get account for uid {}: {}", uid, errno.desc()))),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn home(&self) -> &str {
        &self.home
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn groups(&self) -> &[u32] {
        &self.groups
    }

    fn from_user(user: User) -> Account {
        let uid = user.uid.as_raw();
        let gid = user.gid.as_raw();
        let home = user.dir.to_string_lossy();
        let groups: Vec<u32> = get_user_groups(user.name.as_str(), gid)
            .unwrap_or_default()
            .iter()
            .map(|group| group.gid())
            .collect();

        Account::new(&user.name, &home, uid, gid, groups)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "username = {}, home = {} uid = {}, gid = {}, groups = {:?}", self.username, self.home, self.uid, self.gid, &self.groups)
    }
}
