#[macro_use]
extern crate log;

pub mod common;
pub mod session;
#[cfg(target_os = "linux")]
pub mod logind;
#[cfg(windows)]
pub mod win32;

pub use common::{Result, SessionError, Settings};
pub use session::{factory, Session, SessionInfo, State};

#[cfg(not(any(target_os = "linux", windows)))]
compile_error!("usession supports Linux (systemd-logind) and Windows only");
