//! The platform independent view of an interactive user's login session.
//!
//! Backends implement [`Session`]; [`factory`] picks the one for the host platform.

pub use state::State;
pub use info::SessionInfo;
#[cfg(target_os = "linux")]
pub use account::Account;

mod state;
mod info;
#[cfg(target_os = "linux")]
mod account;

use std::fmt;
use std::sync::Arc;

use crate::common::{Result, PathSettings};

/// Accounts with a uid below this value are system accounts.
pub const FIRST_REGULAR_UID: u32 = 1000;

/// A login session as tracked by the host session manager.
///
/// String getters return an empty string when the value is not available for this session;
/// errors are reserved for failed queries.
pub trait Session: Send + Sync {
    /// Returns the session id assigned by the session manager.
    fn id(&self) -> &str;

    /// Returns the numeric id of the session's user, resolved once and cached.
    fn uid(&self) -> Result<u32>;

    /// Returns the session's username.
    ///
    /// The name is resolved on the first call, or again when `refresh` is set. If the account
    /// database has no entry for the user, `"@"` followed by the session id is returned.
    fn name(&self, refresh: bool) -> Result<String>;

    fn state(&self) -> Result<State>;

    /// Is this a remote session?
    fn remote(&self) -> Result<bool>;

    fn locked(&self) -> Result<bool>;

    /// Is this session in the foreground of its seat?
    fn active(&self) -> Result<bool>;

    /// Does the session belong to a system account?
    fn system(&self) -> Result<bool> {
        Ok(self.uid()? < FIRST_REGULAR_UID)
    }

    /// Returns the user's domain.
    fn domain(&self) -> Result<String> {
        Ok(String::new())
    }

    /// Returns the login name used on the remote host, empty for local sessions.
    fn remote_user(&self) -> Result<String> {
        Ok(String::new())
    }

    /// Returns the X11 display of the session.
    fn display(&self) -> Result<String>;

    /// Returns the session type (x11, wayland, tty, ...).
    fn session_type(&self) -> Result<String>;

    /// Returns the name of the service (as passed during PAM session setup) that registered the session.
    fn service(&self) -> Result<String>;

    /// Returns the class of the session (user, greeter, ...).
    fn classname(&self) -> Result<String>;

    fn seat(&self) -> Result<String> {
        Ok(String::new())
    }

    fn tty(&self) -> Result<String> {
        Ok(String::new())
    }

    fn desktop(&self) -> Result<String> {
        Ok(String::new())
    }

    /// Returns the D-Bus object path of the session.
    fn path(&self) -> Result<String>;

    /// Returns the value of an environment variable as seen by the session's processes,
    /// or an empty string when no process of the session defines it.
    fn getenv(&self, name: &str) -> Result<String>;

    /// Runs `exec` with the effective identity switched to the session's user.
    /// The previous identity is restored when `exec` returns or panics.
    fn call(&self, exec: &mut dyn FnMut()) -> Result<()>;
}

impl dyn Session {
    /// Collects all attributes of the session.
    pub fn info(&self) -> Result<SessionInfo> {
        SessionInfo::collect(self)
    }
}

impl fmt::Display for dyn Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name(false) {
            Ok(name) => write!(formatter, "{}", name),
            Err(_) => write!(formatter, "@{}", self.id()),
        }
    }
}

impl fmt::Debug for dyn Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("Session").field("id", &self.id()).finish()
    }
}

/// Returns the session with the given id, backed by the host platform's session manager.
pub fn factory(sid: &str) -> Arc<dyn Session> {
    factory_with(&PathSettings::default(), sid)
}

/// Same as [`factory`], with explicit locations for the session manager state.
#[cfg(target_os = "linux")]
pub fn factory_with(paths: &PathSettings, sid: &str) -> Arc<dyn Session> {
    Arc::new(crate::logind::LoginDSession::with_paths(sid, paths))
}

#[cfg(windows)]
pub fn factory_with(_paths: &PathSettings, sid: &str) -> Arc<dyn Session> {
    Arc::new(crate::win32::Win32Session::new(sid))
}

/// Returns the ids of all sessions currently known to the session manager.
#[cfg(target_os = "linux")]
pub fn sessions() -> Result<Vec<String>> {
    use crate::logind::{LoginManager, SessionManager};
    LoginManager::new().sessions()
}

#[cfg(windows)]
pub fn sessions() -> Result<Vec<String>> {
    crate::win32::sessions()
}

/// Returns the session the given process belongs to, `None` if it is not part of a session.
#[cfg(target_os = "linux")]
pub fn from_pid(paths: &PathSettings, pid: u32) -> Result<Option<Arc<dyn Session>>> {
    use crate::logind::{LoginManager, SessionManager};
    let sid = LoginManager::new().pid_session(pid)?;
    Ok(sid.map(|sid| factory_with(paths, &sid)))
}

#[cfg(windows)]
pub fn from_pid(paths: &PathSettings, pid: u32) -> Result<Option<Arc<dyn Session>>> {
    let sid = crate::win32::pid_session(pid)?;
    Ok(sid.map(|sid| factory_with(paths, &sid)))
}

/// Returns the session of the calling process.
pub fn current(paths: &PathSettings) -> Result<Option<Arc<dyn Session>>> {
    from_pid(paths, std::process::id())
}
