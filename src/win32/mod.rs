//! Windows backend over the terminal services API.
//!
//! Session ids are the numeric terminal services session ids (`0` is the services session).

use std::ffi::c_void;
use std::{mem, ptr, slice};

use parking_lot::Mutex;
use windows::core::PWSTR;
use windows::Win32::Foundation::{CloseHandle, BOOL, ERROR_INVALID_PARAMETER, HANDLE};
use windows::Win32::Security::{ImpersonateLoggedOnUser, RevertToSelf};
use windows::Win32::System::Environment::{CreateEnvironmentBlock, DestroyEnvironmentBlock};
use windows::Win32::System::RemoteDesktop::{
    ProcessIdToSessionId, WTSEnumerateSessionsW, WTSFreeMemory, WTSQuerySessionInformationW, WTSQueryUserToken,
    WTSActive, WTSClientProtocolType, WTSConnectQuery, WTSConnectState, WTSConnected, WTSDisconnected, WTSDomainName,
    WTSDown, WTSIdle, WTSInit, WTSListen, WTSReset, WTSSessionInfoEx, WTSShadow, WTSUserName, WTSWinStationName,
    WTSINFOEXW, WTS_CONNECTSTATE_CLASS, WTS_CURRENT_SERVER_HANDLE, WTS_INFO_CLASS, WTS_SESSIONSTATE_LOCK,
    WTS_SESSION_INFOW,
};

use crate::common::{Result, SessionError};
use crate::session::{Session, State};

/// Values of `WTSClientProtocolType`.
const PROTOCOL_CONSOLE: u16 = 0;
const PROTOCOL_ICA: u16 = 1;

/// Returns the ids of the sessions on this machine, listener sessions excluded.
pub fn sessions() -> Result<Vec<String>> {
    let mut info: *mut WTS_SESSION_INFOW = ptr::null_mut();
    let mut count = 0u32;
    unsafe { WTSEnumerateSessionsW(WTS_CURRENT_SERVER_HANDLE, 0, 1, &mut info, &mut count) }
        .map_err(|error| context(error, "WTSEnumerateSessionsW"))?;

    if info.is_null() {
        return Ok(Vec::new());
    }

    let listed = unsafe { slice::from_raw_parts(info, count as usize) }
        .iter()
        .filter(|session| session.State != WTSListen)
        .map(|session| session.SessionId.to_string())
        .collect();

    unsafe { WTSFreeMemory(info as *mut c_void) };
    Ok(listed)
}

/// Returns the id of the session process `pid` runs in.
pub fn pid_session(pid: u32) -> Result<Option<String>> {
    let mut id = 0u32;
    unsafe { ProcessIdToSessionId(pid, &mut id) }
        .map_err(|error| context(error, &format!("Cant get session of process {}", pid)))?;
    Ok(Some(id.to_string()))
}

fn current_session_id() -> Option<u32> {
    let mut id = 0u32;
    unsafe { ProcessIdToSessionId(std::process::id(), &mut id) }.ok().map(|_| id)
}

fn context(error: windows::core::Error, context: &str) -> SessionError {
    match SessionError::from(error) {
        SessionError::SystemError(code, message) => SessionError::SystemError(code, format!("{}: {}", context, message)),
        other => other,
    }
}

/// Memory returned by `WTSQuerySessionInformationW`, released on drop.
struct Information {
    buffer: PWSTR,
    length: u32,
}

impl Information {
    fn query(id: u32, class: WTS_INFO_CLASS) -> Result<Information> {
        let mut buffer = PWSTR::null();
        let mut length = 0u32;
        unsafe { WTSQuerySessionInformationW(WTS_CURRENT_SERVER_HANDLE, id, class, &mut buffer, &mut length) }
            .map_err(|error| context(error, &format!("Cant query session {}", id)))?;
        Ok(Information { buffer, length })
    }

    fn text(&self) -> String {
        if self.buffer.is_null() {
            return String::new();
        }
        String::from_utf16_lossy(unsafe { self.buffer.as_wide() })
    }

    fn value<T: Copy>(&self) -> Result<T> {
        if self.buffer.is_null() || (self.length as usize) < mem::size_of::<T>() {
            return Err(SessionError::ProtocolError(format!("Short session information ({} bytes)", self.length)));
        }
        Ok(unsafe { ptr::read_unaligned(self.buffer.0 as *const T) })
    }
}

impl Drop for Information {
    fn drop(&mut self) {
        if !self.buffer.is_null() {
            unsafe { WTSFreeMemory(self.buffer.0 as *mut c_void) };
        }
    }
}

/// Primary token of the user logged on a session, closed on drop.
struct UserToken(HANDLE);

impl UserToken {
    /// Requires the caller to run as LocalSystem.
    fn of_session(id: u32) -> Result<UserToken> {
        let mut token = HANDLE::default();
        unsafe { WTSQueryUserToken(id, &mut token) }
            .map_err(|error| context(error, &format!("Cant get user token of session {}", id)))?;
        Ok(UserToken(token))
    }

    /// Returns the environment block the user gets at logon, as UTF-16 units.
    fn environment(&self) -> Result<Vec<u16>> {
        let mut block: *mut c_void = ptr::null_mut();
        unsafe { CreateEnvironmentBlock(&mut block, self.0, BOOL::from(false)) }
            .map_err(|error| context(error, "CreateEnvironmentBlock"))?;

        let units = block as *const u16;
        let mut length = 0usize;
        // Entries are NUL terminated, the block ends with an empty entry.
        unsafe {
            while *units.add(length) != 0 || *units.add(length + 1) != 0 {
                length += 1;
            }
        }
        let copied = unsafe { slice::from_raw_parts(units, length + 1) }.to_vec();

        if let Err(error) = unsafe { DestroyEnvironmentBlock(block) } {
            warn!("Cant release environment block: {}", error);
        }
        Ok(copied)
    }
}

impl Drop for UserToken {
    fn drop(&mut self) {
        if let Err(error) = unsafe { CloseHandle(self.0) } {
            error!("Cant close user token: {}", error);
        }
    }
}

/// Impersonates a user on the calling thread until dropped.
struct Impersonation;

impl Impersonation {
    fn start(token: &UserToken) -> Result<Impersonation> {
        unsafe { ImpersonateLoggedOnUser(token.0) }.map_err(|error| context(error, "ImpersonateLoggedOnUser"))?;
        Ok(Impersonation)
    }
}

impl Drop for Impersonation {
    fn drop(&mut self) {
        if let Err(error) = unsafe { RevertToSelf() } {
            error!("Cant revert impersonation: {}", error);
        }
    }
}

/// Returns the value of `name` in a UTF-16 `KEY=VALUE` block, names compared without case.
fn block_lookup(block: &[u16], name: &str) -> Option<String> {
    if name.is_empty() || name.contains('=') {
        return None;
    }

    block
        .split(|unit| *unit == 0)
        .take_while(|entry| !entry.is_empty())
        .map(String::from_utf16_lossy)
        .find_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            key.eq_ignore_ascii_case(name).then(|| value.to_string())
        })
}

pub struct Win32Session {
    sid: String,
    username: Mutex<String>,
}

impl Win32Session {
    pub fn new(sid: &str) -> Self {
        Self { sid: sid.to_string(), username: Mutex::new(String::new()) }
    }

    fn number(&self) -> Result<u32> {
        self.sid.parse::<u32>()
            .map_err(|_| SessionError::system(ERROR_INVALID_PARAMETER.0 as i32, format!("Invalid session id '{}'", self.sid)))
    }

    fn is_current(&self) -> bool {
        self.number().is_ok_and(|id| Some(id) == current_session_id())
    }

    fn text(&self, class: WTS_INFO_CLASS) -> Result<String> {
        Ok(Information::query(self.number()?, class)?.text())
    }

    fn protocol(&self) -> Result<u16> {
        Information::query(self.number()?, WTSClientProtocolType)?.value::<u16>()
    }

    fn connect_state(&self) -> Result<WTS_CONNECTSTATE_CLASS> {
        Information::query(self.number()?, WTSConnectState)?.value::<WTS_CONNECTSTATE_CLASS>()
    }
}

impl Session for Win32Session {
    fn id(&self) -> &str {
        &self.sid
    }

    fn uid(&self) -> Result<u32> {
        Err(SessionError::Unsupported("Numeric user ids".to_string()))
    }

    fn name(&self, refresh: bool) -> Result<String> {
        if !refresh {
            let cached = self.username.lock();
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let mut name = self.text(WTSUserName)?;
        if name.is_empty() {
            name = format!("@{}", self.sid);
        }
        *self.username.lock() = name.clone();
        Ok(name)
    }

    fn state(&self) -> Result<State> {
        let state = match self.connect_state()? {
            WTSActive => State::Foreground,
            WTSConnected | WTSDisconnected | WTSIdle | WTSShadow => State::Background,
            WTSConnectQuery | WTSInit => State::Opening,
            WTSReset | WTSDown => State::Closing,
            _ => State::Unknown,
        };
        Ok(state)
    }

    fn remote(&self) -> Result<bool> {
        Ok(self.protocol()? != PROTOCOL_CONSOLE)
    }

    fn locked(&self) -> Result<bool> {
        let info = Information::query(self.number()?, WTSSessionInfoEx)?.value::<WTSINFOEXW>()?;
        if info.Level != 1 {
            return Err(SessionError::ProtocolError(format!("Unexpected session information level {}", info.Level)));
        }
        let flags = unsafe { info.Data.WTSInfoExLevel1.SessionFlags };
        Ok(flags == WTS_SESSIONSTATE_LOCK as i32)
    }

    fn active(&self) -> Result<bool> {
        Ok(self.connect_state()? == WTSActive)
    }

    fn system(&self) -> Result<bool> {
        Ok(self.number()? == 0)
    }

    fn domain(&self) -> Result<String> {
        self.text(WTSDomainName)
    }

    fn display(&self) -> Result<String> {
        Ok(String::new())
    }

    fn session_type(&self) -> Result<String> {
        let protocol = match self.protocol()? {
            PROTOCOL_CONSOLE => "console",
            PROTOCOL_ICA => "ica",
            _ => "rdp",
        };
        Ok(protocol.to_string())
    }

    fn service(&self) -> Result<String> {
        Ok(String::new())
    }

    fn classname(&self) -> Result<String> {
        Ok(if self.system()? { "background" } else { "user" }.to_string())
    }

    /// The window station name (`Console`, `RDP-Tcp#3`, ...).
    fn tty(&self) -> Result<String> {
        self.text(WTSWinStationName)
    }

    fn path(&self) -> Result<String> {
        Ok(String::new())
    }

    /// Reads the user's logon environment. Without the privilege to get the session's user
    /// token, only the caller's own session is readable, from the process environment.
    fn getenv(&self, name: &str) -> Result<String> {
        match UserToken::of_session(self.number()?) {
            Ok(token) => Ok(block_lookup(&token.environment()?, name).unwrap_or_default()),
            Err(error) if self.is_current() => {
                debug!("Using process environment for session {}: {}", self.sid, error);
                Ok(std::env::var(name).unwrap_or_default())
            }
            Err(error) => Err(error),
        }
    }

    fn call(&self, exec: &mut dyn FnMut()) -> Result<()> {
        let token = match UserToken::of_session(self.number()?) {
            Ok(token) => token,
            Err(error) if self.is_current() => {
                debug!("Running as the caller for session {}: {}", self.sid, error);
                exec();
                return Ok(());
            }
            Err(error) => return Err(error),
        };

        let impersonation = Impersonation::start(&token)?;
        exec();
        drop(impersonation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    #[test]
    fn block_lookup_ignores_case() {
        let block = wide("Path=C:\\Windows\0USERNAME=alice\0\0");
        assert_eq!(block_lookup(&block, "PATH").unwrap(), "C:\\Windows");
        assert_eq!(block_lookup(&block, "username").unwrap(), "alice");
        assert_eq!(block_lookup(&block, "USER"), None);
    }

    #[test]
    fn block_lookup_stops_at_empty_entry() {
        let block = wide("A=1\0\0B=2\0");
        assert_eq!(block_lookup(&block, "B"), None);
        assert_eq!(block_lookup(&block, "A=1"), None);
    }

    #[test]
    fn own_session_is_listed() {
        let own = pid_session(std::process::id()).unwrap().unwrap();
        assert!(sessions().unwrap().contains(&own));
        assert!(Win32Session::new(&own).is_current());
    }

    #[test]
    fn invalid_id_is_an_error() {
        let session = Win32Session::new("console");
        assert!(session.state().is_err());
        assert!(!session.is_current());
    }
}
