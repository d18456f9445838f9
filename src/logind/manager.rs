use parking_lot::Mutex;
use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use super::bus::{with_context, LOGIN1_MANAGER_INTERFACE, LOGIN1_PATH, LOGIN1_SERVICE, LOGIN1_SESSION_INTERFACE};
use crate::common::{Result, SessionError};

static NO_SESSION_FOR_PID: &str = "org.freedesktop.login1.NoSessionForPID";

/// Per-session string attributes published by the session manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Display,
    Type,
    Service,
    Class,
    RemoteHost,
    RemoteUser,
    Seat,
    Tty,
    Desktop,
}

impl Field {
    /// Returns the name of the `org.freedesktop.login1.Session` property holding the field.
    pub fn property(&self) -> &'static str {
        match self {
            Field::Display => "Display",
            Field::Type => "Type",
            Field::Service => "Service",
            Field::Class => "Class",
            Field::RemoteHost => "RemoteHost",
            Field::RemoteUser => "RemoteUser",
            Field::Seat => "Seat",
            Field::Tty => "TTY",
            Field::Desktop => "Desktop",
        }
    }
}

/// The session manager's query API.
///
/// Failures are `SessionError::SystemError` carrying the errno the session manager reports:
/// `ENXIO` for an unknown session, `ENODATA` for a value the session does not have.
pub trait SessionManager: Send + Sync {
    fn uid(&self, sid: &str) -> Result<u32>;

    /// Returns the raw state token of the session (`online`, `active`, ...).
    fn state(&self, sid: &str) -> Result<String>;

    fn is_remote(&self, sid: &str) -> Result<bool>;

    fn is_active(&self, sid: &str) -> Result<bool>;

    fn string(&self, sid: &str, field: Field) -> Result<String>;

    /// Returns the id of the session a process belongs to, `None` if it is not part of any session.
    fn pid_session(&self, pid: u32) -> Result<Option<String>>;

    /// Returns the ids of all current sessions.
    fn sessions(&self) -> Result<Vec<String>>;
}

/// Queries systemd-logind through its `org.freedesktop.login1` bus API.
///
/// The system bus connection is opened on the first query and shared by the following ones.
#[derive(Default)]
pub struct LoginManager {
    connection: Mutex<Option<Connection>>,
}

impl LoginManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection(&self) -> Result<Connection> {
        let mut connection = self.connection.lock();
        if let Some(connection) = connection.as_ref() {
            return Ok(connection.clone());
        }

        let opened = Connection::system().map_err(|error| with_context(error, "Cant open system bus"))?;
        *connection = Some(opened.clone());
        Ok(opened)
    }

    fn manager(&self) -> Result<Proxy<'static>> {
        Proxy::new(&self.connection()?, LOGIN1_SERVICE, LOGIN1_PATH, LOGIN1_MANAGER_INTERFACE)
            .map_err(|error| with_context(error, LOGIN1_MANAGER_INTERFACE))
    }

    fn session_at(&self, path: OwnedObjectPath) -> Result<Proxy<'static>> {
        let context = path.to_string();
        Proxy::new(&self.connection()?, LOGIN1_SERVICE, path.into_inner(), LOGIN1_SESSION_INTERFACE)
            .map_err(|error| with_context(error, &context))
    }

    /// Reads a property of session `sid`. An unknown session fails with `ENXIO`.
    fn property<T>(&self, sid: &str, name: &str) -> Result<T>
    where
        T: TryFrom<OwnedValue>,
        T::Error: Into<zbus::Error>,
    {
        let path: OwnedObjectPath = self.manager()?
            .call("GetSession", &(sid,))
            .map_err(|error| with_context(error, &format!("{}.GetSession", LOGIN1_MANAGER_INTERFACE)))?;

        self.session_at(path)?
            .get_property::<T>(name)
            .map_err(|error| with_context(error, &format!("{}.{}", LOGIN1_SESSION_INTERFACE, name)))
    }
}

impl SessionManager for LoginManager {
    fn uid(&self, sid: &str) -> Result<u32> {
        let (uid, _user): (u32, OwnedObjectPath) = self.property(sid, "User")?;
        Ok(uid)
    }

    fn state(&self, sid: &str) -> Result<String> {
        required(self.property(sid, "State")?, libc::EIO, "State", sid)
    }

    fn is_remote(&self, sid: &str) -> Result<bool> {
        self.property(sid, "Remote")
    }

    fn is_active(&self, sid: &str) -> Result<bool> {
        self.property(sid, "Active")
    }

    fn string(&self, sid: &str, field: Field) -> Result<String> {
        let value = match field {
            Field::Seat => {
                let (seat, _path): (String, OwnedObjectPath) = self.property(sid, field.property())?;
                seat
            }
            _ => self.property(sid, field.property())?,
        };
        required(value, libc::ENODATA, field.property(), sid)
    }

    fn pid_session(&self, pid: u32) -> Result<Option<String>> {
        let method = format!("{}.GetSessionByPID", LOGIN1_MANAGER_INTERFACE);

        let path: OwnedObjectPath = match self.manager()?.call("GetSessionByPID", &(pid,)) {
            Ok(path) => path,
            Err(zbus::Error::MethodError(name, _, _)) if name.as_str() == NO_SESSION_FOR_PID => return Ok(None),
            Err(error) => return Err(with_context(error, &method)),
        };

        let sid: String = self.session_at(path)?
            .get_property("Id")
            .map_err(|error| with_context(error, &format!("{}.Id", LOGIN1_SESSION_INTERFACE)))?;

        Ok(Some(sid).filter(|sid| !sid.is_empty()))
    }

    fn sessions(&self) -> Result<Vec<String>> {
        let listed: Vec<(String, u32, String, String, OwnedObjectPath)> = self.manager()?
            .call("ListSessions", &())
            .map_err(|error| with_context(error, &format!("{}.ListSessions", LOGIN1_MANAGER_INTERFACE)))?;

        let mut sessions: Vec<String> = listed.into_iter().map(|(sid, ..)| sid).collect();
        sessions.sort();
        Ok(sessions)
    }
}

/// Rejects an empty property value with `code`, the way sd-login reports unset keys.
fn required(value: String, code: i32, property: &str, sid: &str) -> Result<String> {
    if value.is_empty() {
        return Err(SessionError::system(code, format!("No {} for session '{}'", property, sid)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_name_session_properties() {
        assert_eq!(Field::Display.property(), "Display");
        assert_eq!(Field::RemoteHost.property(), "RemoteHost");
        assert_eq!(Field::Tty.property(), "TTY");
        assert_eq!(Field::Seat.property(), "Seat");
    }

    #[test]
    fn empty_value_is_missing() {
        let error = required(String::new(), libc::ENODATA, "Display", "7").unwrap_err();
        assert_eq!(error.code(), Some(libc::ENODATA));
        assert!(error.to_string().contains("No Display for session '7'"));

        assert_eq!(required(String::new(), libc::EIO, "State", "7").unwrap_err().code(), Some(libc::EIO));
    }

    #[test]
    fn present_value_is_kept() {
        assert_eq!(required("x11".into(), libc::ENODATA, "Type", "7").unwrap(), "x11");
    }

    #[test]
    fn connection_is_opened_lazily() {
        let manager = LoginManager::new();
        assert!(manager.connection.lock().is_none());
    }
}
