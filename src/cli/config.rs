//! groupd configuration file handling
//!
//! Provides default configuration generation and loading for the daemon.
//! Configuration files are TOML and live next to the account data directory.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level
const DEFAULT_LOG_LEVEL: &str = "info";

/// Default bound on authority round trips and deliveries
const DEFAULT_TIMEOUT: &str = "30s";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub authority: AuthorityConfig,

    #[serde(default)]
    pub delivery: DeliveryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where per-account snapshots are kept
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityConfig {
    /// How long a caller waits for the authority, e.g. "30s" or "2m"
    #[serde(default = "default_timeout")]
    pub commit_timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// How long a broadcast may take before it counts as partial
    #[serde(default = "default_timeout")]
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); RUST_LOG overrides it
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

fn default_timeout() -> String {
    DEFAULT_TIMEOUT.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            commit_timeout: default_timeout(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
        }
    }
}

impl AuthorityConfig {
    pub fn commit_timeout(&self) -> Result<Duration, Box<dyn std::error::Error>> {
        parse_timeout("authority.commit_timeout", &self.commit_timeout)
    }
}

impl DeliveryConfig {
    pub fn timeout(&self) -> Result<Duration, Box<dyn std::error::Error>> {
        parse_timeout("delivery.timeout", &self.timeout)
    }
}

fn parse_timeout(key: &str, value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let timeout = humantime::parse_duration(value)
        .map_err(|e| format!("Invalid duration for {} ({:?}): {}", key, value, e))?;
    if timeout.is_zero() {
        return Err(format!("{} must be greater than zero", key).into());
    }
    Ok(timeout)
}

impl DaemonConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            store: StoreConfig { data_dir },
            authority: AuthorityConfig::default(),
            delivery: DeliveryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file '{}': {}", path.display(), e))?;

        let config: DaemonConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse config file '{}': {}", path.display(), e))?;

        Ok(config)
    }

    /// Generate default configuration content as a string with comments
    pub fn generate_default_toml(data_dir: &Path) -> String {
        format!(
            r#"# groupd configuration
#
# Deployment settings only. Group state lives with the group authority and in
# the per-account snapshots under [store] data_dir.

[store]
# Directory holding one <account>.cbor snapshot per account
data_dir = "{data_dir}"

[authority]
# How long a request waits for the group authority before it reports
# CommitUnavailable. A change may still land after the wait ends, so callers
# should re-query the group before retrying.
commit_timeout = "{timeout}"

[delivery]
# How long broadcasting a change to members may take
timeout = "{timeout}"

[logging]
# Log level: trace, debug, info, warn, error (RUST_LOG takes precedence)
level = "info"

# Log file path (optional, logs to stderr if not specified)
# file = "/var/log/groupd/groupd.log"
"#,
            data_dir = data_dir.display(),
            timeout = DEFAULT_TIMEOUT,
        )
    }

    /// Create and save a default configuration file
    pub fn create_default(
        config_path: &Path,
        data_dir: &Path,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let contents = Self::generate_default_toml(data_dir);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        fs::write(config_path, contents).map_err(|e| {
            format!(
                "Failed to write config file '{}': {}",
                config_path.display(),
                e
            )
        })?;

        Ok(())
    }

    /// Resolve the configuration for a subcommand.
    ///
    /// Uses `--config` when given, else `config.toml` next to the data
    /// directory, creating a default one when missing. `--data-dir` overrides
    /// the file. Returns whether a default file was written.
    pub fn resolve(
        config_path: Option<String>,
        data_dir: Option<String>,
    ) -> Result<(Self, PathBuf, bool), Box<dyn std::error::Error>> {
        let data_dir = data_dir.map(PathBuf::from);
        let data_dir_hint = data_dir.clone().unwrap_or_else(default_data_dir);
        let config_path = config_path
            .map(PathBuf::from)
            .unwrap_or_else(|| default_config_path(&data_dir_hint));

        let created = !config_path.exists();
        if created {
            Self::create_default(&config_path, &data_dir_hint)?;
        }

        let mut config = Self::load(&config_path)?;
        if let Some(data_dir) = data_dir {
            config.store.data_dir = data_dir;
        }
        Ok((config, config_path, created))
    }
}

/// Get the default config file path based on the data directory
///
/// - Data: ~/.local/share/groupd/accounts/
/// - Config: ~/.local/share/groupd/config.toml
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.parent().unwrap_or(data_dir).join("config.toml")
}

/// Get the default data directory
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("groupd")
        .join("accounts")
}
