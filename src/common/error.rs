use std::error::Error;
use std::result;
use std::fmt;

pub type Result<T> = result::Result<T, SessionError>;

#[derive(Debug)]
pub enum SessionError {
    SystemError(i32, String),
    ProtocolError(String),
    AccountError(String),
    Unsupported(String),
    IoError(std::io::Error),
    ConfigError(config::ConfigError),
}

impl SessionError {
    /// Returns the errno carried by the error, if any.
    pub fn code(&self) -> Option<i32> {
        match self {
            SessionError::SystemError(code, _) => Some(*code),
            SessionError::IoError(err) => err.raw_os_error(),
            _ => None,
        }
    }

    /// Builds a `SystemError` from an errno and an operation-specific message.
    pub fn system(code: i32, message: impl Into<String>) -> Self {
        SessionError::SystemError(code, message.into())
    }
}

impl Error for SessionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SessionError::IoError(err) => Some(err),
            SessionError::ConfigError(err) => Some(err),
            _ => None,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SessionError::SystemError(code, message) => write!(formatter, "SystemError: {} ({}: {})", message, code, describe_errno(*code)),
            SessionError::ProtocolError(message) => write!(formatter, "ProtocolError: {}", message),
            SessionError::AccountError(message) => write!(formatter, "AccountError: {}", message),
            SessionError::Unsupported(message) => write!(formatter, "Unsupported: {}", message),
            SessionError::IoError(err) => write!(formatter, "IoError: {}", err),
            SessionError::ConfigError(err) => write!(formatter, "ConfigError: {}", err),
        }
    }
}

fn describe_errno(code: i32) -> String {
    std::io::Error::from_raw_os_error(code).to_string()
}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::IoError(err)
    }
}

impl From<config::ConfigError> for SessionError {
    fn from(err: config::ConfigError) -> Self {
        SessionError::ConfigError(err)
    }
}

#[cfg(target_os = "linux")]
impl From<nix::errno::Errno> for SessionError {
    fn from(err: nix::errno::Errno) -> Self {
        SessionError::SystemError(err as i32, err.desc().to_string())
    }
}

#[cfg(target_os = "linux")]
impl From<zbus::Error> for SessionError {
    fn from(err: zbus::Error) -> Self {
        match err {
            zbus::Error::MethodError(name, description, _) => {
                let message = description.unwrap_or_else(|| name.to_string());
                SessionError::SystemError(crate::logind::errno_for_bus_error(name.as_str()), message)
            }
            zbus::Error::FDO(err) => {
                let name = zbus::DBusError::name(&*err).to_string();
                let message = zbus::DBusError::description(&*err).unwrap_or(&name).to_string();
                SessionError::SystemError(crate::logind::errno_for_bus_error(&name), message)
            }
            zbus::Error::InputOutput(err) => {
                let code = err.raw_os_error().unwrap_or(libc::EIO);
                SessionError::SystemError(code, err.to_string())
            }
            zbus::Error::Address(message) => SessionError::SystemError(libc::ECONNREFUSED, message),
            other => SessionError::ProtocolError(other.to_string()),
        }
    }
}

#[cfg(windows)]
impl From<windows::core::Error> for SessionError {
    fn from(err: windows::core::Error) -> Self {
        // Win32 error codes wrapped in an HRESULT (FACILITY_WIN32) are unwrapped.
        let code = err.code().0;
        let code = if (code as u32) & 0xFFFF_0000 == 0x8007_0000 { code & 0xFFFF } else { code };
        SessionError::SystemError(code, err.message().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_error_exposes_code() {
        let error = SessionError::system(6, "no such session");
        assert_eq!(error.code(), Some(6));
        assert!(error.to_string().contains("no such session"));
    }

    #[test]
    fn protocol_error_has_no_code() {
        let error = SessionError::ProtocolError("empty reply".into());
        assert_eq!(error.code(), None);
        assert_eq!(error.to_string(), "ProtocolError: empty reply");
    }

    #[test]
    fn io_error_keeps_os_code() {
        let error: SessionError = std::io::Error::from_raw_os_error(2).into();
        assert_eq!(error.code(), Some(2));
    }
}
