use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::{environment, Field, IdentityGuard, LoginManager, SessionBus, SessionManager, SystemBus};
use crate::common::{PathSettings, Result, SessionError};
use crate::session::{Account, Session, State};

/// Account values resolved on first use.
#[derive(Default)]
struct Cache {
    uid: Option<u32>,
    username: String,
}

/// A session managed by systemd-logind.
pub struct LoginDSession {
    sid: String,
    proc_root: PathBuf,
    manager: Arc<dyn SessionManager>,
    bus: Arc<dyn SessionBus>,
    cache: Mutex<Cache>,
    path: Mutex<String>,
}

impl LoginDSession {
    /// Creates a session scanning the default `/proc` for environments.
    pub fn new(sid: &str) -> Self {
        Self::with_paths(sid, &PathSettings::default())
    }

    pub fn with_paths(sid: &str, paths: &PathSettings) -> Self {
        Self::with_backends(sid, &paths.proc_root, Arc::new(LoginManager::new()), Arc::new(SystemBus::new()))
    }

    /// Creates a session on top of explicit session manager and bus implementations.
    ///
    /// # Arguments
    /// * `sid` - The session id.
    /// * `proc_root` - The process information root scanned by `getenv`.
    /// * `manager` - The session manager queries.
    /// * `bus` - The system bus requests.
    pub fn with_backends(sid: &str, proc_root: impl AsRef<Path>, manager: Arc<dyn SessionManager>, bus: Arc<dyn SessionBus>) -> Self {
        Self {
            sid: sid.to_string(),
            proc_root: proc_root.as_ref().to_path_buf(),
            manager,
            bus,
            cache: Mutex::new(Cache::default()),
            path: Mutex::new(String::new()),
        }
    }

    /// Queries a string attribute. A value the session does not have gives an empty string.
    fn get(&self, field: Field) -> Result<String> {
        match self.manager.string(&self.sid, field) {
            Ok(value) => Ok(value),
            Err(error) if error.code() == Some(libc::ENODATA) => Ok(String::new()),
            Err(error) => Err(error),
        }
    }
}

impl Session for LoginDSession {
    fn id(&self) -> &str {
        &self.sid
    }

    fn uid(&self) -> Result<u32> {
        if let Some(uid) = self.cache.lock().uid {
            return Ok(uid);
        }

        let uid = self.manager.uid(&self.sid).map_err(|error| match error {
            SessionError::SystemError(code, message) => {
                SessionError::SystemError(code, format!("Cant get UID for session '{}': {}", self.sid, message))
            }
            other => other,
        })?;

        // A concurrent resolution may have won, its value is kept.
        let uid = *self.cache.lock().uid.get_or_insert(uid);
        Ok(uid)
    }

    fn name(&self, refresh: bool) -> Result<String> {
        if !refresh {
            let cache = self.cache.lock();
            if !cache.username.is_empty() {
                return Ok(cache.username.clone());
            }
        }

        let uid = self.uid()?;
        let username = match Account::from_uid(uid)? {
            Some(account) => account.username().to_string(),
            None => {
                warn!("No account for uid {} of session {}", uid, self.sid);
                format!("@{}", self.sid)
            }
        };

        self.cache.lock().username = username.clone();
        Ok(username)
    }

    fn state(&self) -> Result<State> {
        Ok(State::from_token(&self.manager.state(&self.sid)?))
    }

    fn remote(&self) -> Result<bool> {
        self.manager.is_remote(&self.sid)
    }

    fn locked(&self) -> Result<bool> {
        let path = self.path()?;
        self.bus.locked_hint(&path)
    }

    fn active(&self) -> Result<bool> {
        match self.manager.is_active(&self.sid) {
            Err(error) if error.code() == Some(libc::ENXIO) => Ok(false),
            result => result,
        }
    }

    fn domain(&self) -> Result<String> {
        self.get(Field::RemoteHost)
    }

    fn remote_user(&self) -> Result<String> {
        self.get(Field::RemoteUser)
    }

    fn display(&self) -> Result<String> {
        self.get(Field::Display)
    }

    fn session_type(&self) -> Result<String> {
        self.get(Field::Type)
    }

    fn service(&self) -> Result<String> {
        self.get(Field::Service)
    }

    fn classname(&self) -> Result<String> {
        self.get(Field::Class)
    }

    fn seat(&self) -> Result<String> {
        self.get(Field::Seat)
    }

    fn tty(&self) -> Result<String> {
        self.get(Field::Tty)
    }

    fn desktop(&self) -> Result<String> {
        self.get(Field::Desktop)
    }

    fn path(&self) -> Result<String> {
        // Only path callers wait on the request, they share its result.
        let mut cached = self.path.lock();
        if !cached.is_empty() {
            return Ok(cached.clone());
        }

        let path = self.bus.get_session(&self.sid)?;
        if path.is_empty() {
            return Err(SessionError::ProtocolError(format!("Empty object path for session '{}'", self.sid)));
        }

        debug!("Session {} is at {}", self.sid, path);
        *cached = path.clone();
        Ok(path)
    }

    fn getenv(&self, name: &str) -> Result<String> {
        let uid = self.uid()?;
        environment::scan(&self.proc_root, uid, &self.sid, self.manager.as_ref(), name)
    }

    fn call(&self, exec: &mut dyn FnMut()) -> Result<()> {
        let uid = self.uid()?;
        let account = Account::from_uid(uid)?
            .ok_or_else(|| SessionError::AccountError(format!("No account for uid {} of session '{}'", uid, self.sid)))?;

        let guard = IdentityGuard::switch_to(&account)?;
        exec();
        drop(guard);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    #[derive(Default)]
    struct MockManager {
        uid: Option<u32>,
        state: Option<String>,
        remote: Option<bool>,
        active: Option<bool>,
        strings: HashMap<&'static str, String>,
        uid_queries: AtomicUsize,
    }

    fn missing(sid: &str) -> SessionError {
        SessionError::system(libc::ENXIO, format!("No session '{}'", sid))
    }

    impl SessionManager for MockManager {
        fn uid(&self, sid: &str) -> Result<u32> {
            self.uid_queries.fetch_add(1, Ordering::SeqCst);
            self.uid.ok_or_else(|| missing(sid))
        }

        fn state(&self, sid: &str) -> Result<String> {
            self.state.clone().ok_or_else(|| missing(sid))
        }

        fn is_remote(&self, _sid: &str) -> Result<bool> {
            self.remote.ok_or_else(|| SessionError::system(libc::ENODATA, "no REMOTE"))
        }

        fn is_active(&self, sid: &str) -> Result<bool> {
            self.active.ok_or_else(|| missing(sid))
        }

        fn string(&self, sid: &str, field: Field) -> Result<String> {
            if self.uid.is_none() {
                return Err(missing(sid));
            }
            self.strings.get(field.property()).cloned().ok_or_else(|| SessionError::system(libc::ENODATA, field.property()))
        }

        fn pid_session(&self, _pid: u32) -> Result<Option<String>> {
            Ok(None)
        }

        fn sessions(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct MockBus {
        path: String,
        locked: bool,
        calls: AtomicUsize,
    }

    impl SessionBus for MockBus {
        fn get_session(&self, _sid: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.path.clone())
        }

        fn locked_hint(&self, path: &str) -> Result<bool> {
            assert_eq!(path, self.path);
            Ok(self.locked)
        }
    }

    fn session(manager: MockManager, bus: Arc<MockBus>) -> LoginDSession {
        LoginDSession::with_backends("7", "/nonexistent/proc", Arc::new(manager), bus)
    }

    fn manager_with_uid(uid: u32) -> MockManager {
        MockManager { uid: Some(uid), ..Default::default() }
    }

    #[test]
    fn system_boundary() {
        let bus = Arc::new(MockBus::default());
        assert!(session(manager_with_uid(0), bus.clone()).system().unwrap());
        assert!(session(manager_with_uid(999), bus.clone()).system().unwrap());
        assert!(!session(manager_with_uid(1000), bus.clone()).system().unwrap());
        assert!(!session(manager_with_uid(1001), bus).system().unwrap());
    }

    #[test]
    fn uid_is_resolved_once() {
        let manager = Arc::new(manager_with_uid(1000));
        let session = LoginDSession::with_backends("7", "/nonexistent/proc", manager.clone(), Arc::new(MockBus::default()));

        assert_eq!(session.uid().unwrap(), 1000);
        assert_eq!(session.uid().unwrap(), 1000);
        session.system().unwrap();
        assert_eq!(manager.uid_queries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unknown_session_uid_is_an_error() {
        let session = session(MockManager::default(), Arc::new(MockBus::default()));
        let error = session.uid().unwrap_err();
        assert_eq!(error.code(), Some(libc::ENXIO));
        assert!(error.to_string().contains("Cant get UID for session '7'"));
        assert!(session.name(false).is_err());
    }

    #[test]
    fn name_of_known_account() {
        let session = session(manager_with_uid(0), Arc::new(MockBus::default()));
        assert_eq!(session.name(false).unwrap(), "root");
        assert_eq!(session.name(true).unwrap(), "root");
    }

    #[test]
    fn name_falls_back_to_session_id() {
        let session = session(manager_with_uid(4_000_000_000), Arc::new(MockBus::default()));
        assert_eq!(session.name(false).unwrap(), "@7");
    }

    #[test]
    fn path_is_cached() {
        let bus = Arc::new(MockBus { path: "/org/freedesktop/login1/session/_37".into(), ..Default::default() });
        let session = session(manager_with_uid(1000), bus.clone());

        assert_eq!(session.path().unwrap(), "/org/freedesktop/login1/session/_37");
        assert_eq!(session.path().unwrap(), "/org/freedesktop/login1/session/_37");
        assert_eq!(bus.calls.load(Ordering::SeqCst), 1);
    }

    /// Holds the object path request open until the test releases it.
    struct GatedBus {
        entered: Barrier,
        release: Barrier,
        calls: AtomicUsize,
    }

    impl SessionBus for GatedBus {
        fn get_session(&self, _sid: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.wait();
            self.release.wait();
            Ok("/org/freedesktop/login1/session/_37".into())
        }

        fn locked_hint(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }
    }

    #[test]
    fn uid_is_available_during_path_request() {
        let bus = Arc::new(GatedBus { entered: Barrier::new(2), release: Barrier::new(2), calls: AtomicUsize::new(0) });
        let session = Arc::new(LoginDSession::with_backends("7", "/nonexistent/proc", Arc::new(manager_with_uid(1000)), bus.clone()));

        let requester = {
            let session = session.clone();
            thread::spawn(move || session.path().unwrap())
        };

        bus.entered.wait();
        assert_eq!(session.uid().unwrap(), 1000);
        assert!(session.system().is_ok());
        bus.release.wait();

        assert_eq!(requester.join().unwrap(), "/org/freedesktop/login1/session/_37");
        assert_eq!(session.path().unwrap(), "/org/freedesktop/login1/session/_37");
        assert_eq!(bus.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_path_is_a_protocol_error_and_not_cached() {
        let bus = Arc::new(MockBus::default());
        let session = session(manager_with_uid(1000), bus.clone());

        assert!(matches!(session.path(), Err(SessionError::ProtocolError(_))));
        assert!(session.path().is_err());
        assert_eq!(bus.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn locked_reads_hint_of_cached_path() {
        let bus = Arc::new(MockBus { path: "/org/freedesktop/login1/session/_37".into(), locked: true, ..Default::default() });
        let session = session(manager_with_uid(1000), bus.clone());

        assert!(session.locked().unwrap());
        assert!(session.locked().unwrap());
        assert_eq!(bus.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn state_tokens_are_mapped() {
        let manager = MockManager { state: Some("online".into()), ..manager_with_uid(1000) };
        assert_eq!(session(manager, Arc::new(MockBus::default())).state().unwrap(), State::Background);

        let manager = MockManager { state: Some("lingering".into()), ..manager_with_uid(1000) };
        assert_eq!(session(manager, Arc::new(MockBus::default())).state().unwrap(), State::Unknown);
    }

    #[test]
    fn missing_values_are_empty_strings() {
        let mut manager = manager_with_uid(1000);
        manager.strings.insert("Display", ":0".into());
        let session = session(manager, Arc::new(MockBus::default()));

        assert_eq!(session.display().unwrap(), ":0");
        assert_eq!(session.session_type().unwrap(), "");
        assert_eq!(session.service().unwrap(), "");
        assert_eq!(session.classname().unwrap(), "");
        assert_eq!(session.domain().unwrap(), "");
    }

    #[test]
    fn remote_without_value_is_an_error() {
        let s = session(manager_with_uid(1000), Arc::new(MockBus::default()));
        assert_eq!(s.remote().unwrap_err().code(), Some(libc::ENODATA));

        let manager = MockManager { remote: Some(true), ..manager_with_uid(1000) };
        assert!(session(manager, Arc::new(MockBus::default())).remote().unwrap());
    }

    #[test]
    fn unknown_session_propagates_from_getters() {
        let session = session(MockManager::default(), Arc::new(MockBus::default()));
        assert_eq!(session.display().unwrap_err().code(), Some(libc::ENXIO));
        assert_eq!(session.classname().unwrap_err().code(), Some(libc::ENXIO));
    }

    #[test]
    fn vanished_session_is_inactive() {
        let vanished = session(MockManager::default(), Arc::new(MockBus::default()));
        assert!(!vanished.active().unwrap());

        let manager = MockManager { active: Some(true), ..manager_with_uid(1000) };
        assert!(session(manager, Arc::new(MockBus::default())).active().unwrap());
    }

    #[test]
    fn call_as_current_user_runs_closure() {
        let uid = nix::unistd::geteuid().as_raw();
        if Account::from_uid(uid).unwrap().is_none() {
            return;
        }
        let session = session(manager_with_uid(uid), Arc::new(MockBus::default()));

        let mut called = 0;
        session.call(&mut || called += 1).unwrap();
        assert_eq!(called, 1);
        assert_eq!(nix::unistd::geteuid().as_raw(), uid);
    }

    #[test]
    fn call_without_account_fails_before_running() {
        let session = session(manager_with_uid(4_000_000_000), Arc::new(MockBus::default()));

        let mut called = false;
        let result = session.call(&mut || called = true);
        assert!(matches!(result, Err(SessionError::AccountError(_))));
        assert!(!called);
    }
}
