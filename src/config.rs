use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the rule mirror inside [`Config::data_dir`].
pub const MIRROR_FILE_NAME: &str = "firewall-rules.json";

/// Engine configuration. Every field has a default, so a partial (or empty) JSON object is a
/// valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Name of the nf_tables table owned by the engine.
    pub table_name: String,
    /// Directory holding the rule mirror.
    pub data_dir: PathBuf,
    /// Bound on the wait for a netfilter answer. `None` waits forever.
    pub kernel_timeout_ms: Option<u64>,
    /// Capacity of the change notification queue.
    pub notify_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            table_name: "hostwall".to_string(),
            data_dir: PathBuf::from("/var/lib/hostwall"),
            kernel_timeout_ms: None,
            notify_queue: 16,
        }
    }
}

impl Config {
    /// Reads the configuration from a JSON file. A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config: Config = match fs::read_to_string(path) {
            Ok(json) => serde_json::from_str(&json)?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {}, using defaults", path.display());
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        // nf_tables object names are limited to NFT_NAME_MAXLEN (256) bytes, NUL included
        if self.table_name.is_empty() || self.table_name.len() > 255 {
            return Err(ConfigError::Invalid(format!(
                "table_name '{}' must hold between 1 and 255 bytes",
                self.table_name
            )));
        }
        if self.notify_queue == 0 {
            return Err(ConfigError::Invalid(
                "notify_queue must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn mirror_path(&self) -> PathBuf {
        self.data_dir.join(MIRROR_FILE_NAME)
    }

    pub fn kernel_timeout(&self) -> Option<Duration> {
        self.kernel_timeout_ms.map(Duration::from_millis)
    }
}
