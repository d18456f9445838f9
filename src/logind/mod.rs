//! systemd-logind backend.

pub use session::LoginDSession;
pub use manager::{SessionManager, LoginManager, Field};
pub use bus::{SessionBus, SystemBus, errno_for_bus_error, LOGIN1_SERVICE, LOGIN1_PATH, LOGIN1_MANAGER_INTERFACE, LOGIN1_SESSION_INTERFACE};
pub use environment::{lookup, scan};
pub use identity::IdentityGuard;

mod session;
mod manager;
mod bus;
mod environment;
mod identity;
