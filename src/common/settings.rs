use serde::Deserialize;
use std::path::Path;

pub static DEFAULT_CONFIG_PATH: &str = "/etc/usession/usession.yml";
pub static DEFAULT_PROC_ROOT: &str = "/proc";

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
    pub format: Option<String>,
    pub console: Option<bool>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: None,
            console: Some(true),
        }
    }
}

/// Location of the process-information filesystem scanned for session environments.
#[derive(Debug, Deserialize, Clone)]
pub struct PathSettings {
    pub proc_root: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            proc_root: DEFAULT_PROC_ROOT.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub paths: PathSettings,
}

impl Settings {
    /// Loads the settings from a YAML file layered with `USESSION_*` environment variables.
    ///
    /// # Arguments
    /// * `config_path` - Path to the configuration file, the default location is used when empty.
    ///   The file is optional.
    pub fn new(config_path: &str) -> Result<Self, config::ConfigError> {
        let config_path = if config_path.is_empty() { DEFAULT_CONFIG_PATH } else { config_path };

        let settings_raw = config::Config::builder()
            .set_default("logging.level", "info")?
            .set_default("paths.proc_root", DEFAULT_PROC_ROOT)?
            .add_source(config::File::new(config_path, config::FileFormat::Yaml).required(false))
            .add_source(config::Environment::with_prefix("USESSION").prefix_separator("_").separator("__"))
            .build()?;

        settings_raw.try_deserialize()
    }

    pub fn verify(&self) -> bool {
        if !Path::new(&self.paths.proc_root).is_dir() {
            error!("Process information root {} is not a directory", self.paths.proc_root);
            return false;
        }

        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            error!("Invalid logging level \"{}\"", self.logging.level);
            return false;
        }

        true
    }
}
