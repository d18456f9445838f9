pub use error::{SessionError, Result};
pub use settings::{Settings, LoggingSettings, PathSettings, DEFAULT_CONFIG_PATH, DEFAULT_PROC_ROOT};

mod error;
mod settings;
