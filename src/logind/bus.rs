use zbus::blocking::{Connection, Proxy};
use zbus::zvariant::OwnedObjectPath;

use crate::common::{Result, SessionError};

pub static LOGIN1_SERVICE: &str = "org.freedesktop.login1";
pub static LOGIN1_PATH: &str = "/org/freedesktop/login1";
pub static LOGIN1_MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";
pub static LOGIN1_SESSION_INTERFACE: &str = "org.freedesktop.login1.Session";

/// The system bus requests a session needs.
pub trait SessionBus: Send + Sync {
    /// Returns the object path of the session, `org.freedesktop.login1.Manager.GetSession`.
    fn get_session(&self, sid: &str) -> Result<String>;

    /// Reads the `LockedHint` property of the session object at `path`.
    fn locked_hint(&self, path: &str) -> Result<bool>;
}

/// Talks to systemd-logind over the system bus. Every request opens its own connection,
/// which is closed when the request returns.
#[derive(Debug, Default, Clone)]
pub struct SystemBus;

impl SystemBus {
    pub fn new() -> Self {
        Self
    }
}

impl SessionBus for SystemBus {
    fn get_session(&self, sid: &str) -> Result<String> {
        let method = format!("{}.GetSession", LOGIN1_MANAGER_INTERFACE);

        let connection = Connection::system().map_err(|error| with_context(error, "Cant open system bus"))?;
        let manager = Proxy::new(&connection, LOGIN1_SERVICE, LOGIN1_PATH, LOGIN1_MANAGER_INTERFACE)
            .map_err(|error| with_context(error, &method))?;

        let path: OwnedObjectPath = manager.call("GetSession", &(sid,))
            .map_err(|error| with_context(error, &method))?;

        let path = path.as_str();
        if path.is_empty() || path == "/" {
            return Err(SessionError::ProtocolError(format!("Empty response from {}", method)));
        }

        Ok(path.to_string())
    }

    fn locked_hint(&self, path: &str) -> Result<bool> {
        let connection = Connection::system().map_err(|error| with_context(error, "Cant open system bus"))?;
        let session = Proxy::new(&connection, LOGIN1_SERVICE, path, LOGIN1_SESSION_INTERFACE)
            .map_err(|error| with_context(error, path))?;

        session.get_property::<bool>("LockedHint")
            .map_err(|error| with_context(error, &format!("{}.LockedHint", LOGIN1_SESSION_INTERFACE)))
    }
}

/// Converts a bus error, prefixing its message with the request that failed.
pub(super) fn with_context(error: zbus::Error, context: &str) -> SessionError {
    match SessionError::from(error) {
        SessionError::SystemError(code, message) => SessionError::SystemError(code, format!("{}: {}", context, message)),
        SessionError::ProtocolError(message) => SessionError::ProtocolError(format!("{}: {}", context, message)),
        other => other,
    }
}

/// Translates a D-Bus error name to the errno sd-bus would report for it.
pub fn errno_for_bus_error(name: &str) -> i32 {
    match name {
        "org.freedesktop.login1.NoSuchSession"
        | "org.freedesktop.login1.NoSuchUser"
        | "org.freedesktop.login1.NoSuchSeat"
        | "org.freedesktop.login1.NoSessionForPID"
        | "org.freedesktop.login1.NoUserForPID"
        | "org.freedesktop.DBus.Error.NameHasNoOwner" => libc::ENXIO,
        "org.freedesktop.DBus.Error.AccessDenied"
        | "org.freedesktop.DBus.Error.InteractiveAuthorizationRequired" => libc::EACCES,
        "org.freedesktop.DBus.Error.NoMemory" => libc::ENOMEM,
        "org.freedesktop.DBus.Error.ServiceUnknown" => libc::EHOSTUNREACH,
        "org.freedesktop.DBus.Error.NoReply"
        | "org.freedesktop.DBus.Error.Timeout" => libc::ETIMEDOUT,
        "org.freedesktop.DBus.Error.InvalidArgs" => libc::EINVAL,
        "org.freedesktop.DBus.Error.UnknownMethod"
        | "org.freedesktop.DBus.Error.UnknownObject"
        | "org.freedesktop.DBus.Error.UnknownInterface" => libc::EBADR,
        "org.freedesktop.DBus.Error.UnknownProperty" => libc::ENOENT,
        "org.freedesktop.DBus.Error.NotSupported" => libc::EOPNOTSUPP,
        "org.freedesktop.DBus.Error.Disconnected" => libc::ECONNRESET,
        "org.freedesktop.DBus.Error.LimitsExceeded" => libc::ENOBUFS,
        _ => libc::EIO,
    }
}
