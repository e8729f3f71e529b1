use std::fs;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CachePolicy;
use crate::util::paths::config_path;

/// Example configuration file contents (bundled with the binary)
pub const EXAMPLE_CONFIG: &str = include_str!("config.toml.example");

/// Default idle time before a session is dropped
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
    #[error("Failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Application configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Eviction policy for memoized functions
    pub cache: CachePolicy,
    /// Session lifecycle settings
    pub session: SessionConfig,
    /// Log filter used when RUST_LOG is unset
    pub log_filter: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Sessions with no rerun for this long are dropped
    pub idle_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache: CachePolicy::unbounded(),
            session: SessionConfig::default(),
            log_filter: "warn".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TomlCacheConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_entries: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TomlSessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout_secs: Option<u64>,
}

/// TOML representation of the config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Log filter directive
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
    /// Memoization cache configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<TomlCacheConfig>,
    /// Session configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<TomlSessionConfig>,
}

impl Config {
    /// Load configuration from the default location, merging with defaults.
    ///
    /// Writes the example config on first run. If the file cannot be
    /// written either, the defaults are used. A file that exists but cannot
    /// be read or parsed is an error, same as for [`Config::from_path`].
    pub fn load() -> Result<Self, ConfigError> {
        let config_file = config_path();

        if !config_file.exists() {
            Self::create_default_config(&config_file);
        }

        if !config_file.exists() {
            return Ok(Config::default());
        }

        Self::from_path(&config_file)
    }

    /// Load configuration from an explicit path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Parse configuration text, merging it over the defaults
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let mut config = Config::default();

        if let Some(filter) = toml_config.log_filter {
            config.log_filter = filter;
        }

        if let Some(cache) = toml_config.cache {
            if let Some(ttl_secs) = cache.ttl_secs {
                if ttl_secs == 0 {
                    return Err(ConfigError::Invalid(
                        "cache.ttl_secs must be greater than zero".to_string(),
                    ));
                }
                config.cache.ttl = Some(Duration::from_secs(ttl_secs));
            }
            if let Some(max_entries) = cache.max_entries {
                let capacity = NonZeroUsize::new(max_entries).ok_or_else(|| {
                    ConfigError::Invalid("cache.max_entries must be greater than zero".to_string())
                })?;
                config.cache.max_entries = Some(capacity);
            }
        }

        if let Some(session) = toml_config.session {
            if let Some(secs) = session.idle_timeout_secs {
                if secs == 0 {
                    return Err(ConfigError::Invalid(
                        "session.idle_timeout_secs must be greater than zero".to_string(),
                    ));
                }
                config.session.idle_timeout = Duration::from_secs(secs);
            }
        }

        Ok(config)
    }

    /// Create the default config file from the bundled example.
    /// Runs before logging is set up, so failures go to stderr.
    fn create_default_config(path: &Path) {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create config directory: {}", e);
                    return;
                }
            }
        }

        if let Err(e) = fs::write(path, EXAMPLE_CONFIG) {
            eprintln!("Failed to write default config: {}", e);
        }
    }

    pub fn with_cache_policy(mut self, policy: CachePolicy) -> Self {
        self.cache = policy;
        self
    }

    pub fn with_session_config(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// Render the effective configuration as TOML. Unset limits are left
    /// out, so the output parses back to the same `Config`.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let layer = TomlConfig {
            log_filter: Some(self.log_filter.clone()),
            cache: Some(TomlCacheConfig {
                ttl_secs: self.cache.ttl.map(|ttl| ttl.as_secs()),
                max_entries: self.cache.max_entries.map(NonZeroUsize::get),
            }),
            session: Some(TomlSessionConfig {
                idle_timeout_secs: Some(self.session.idle_timeout.as_secs()),
            }),
        };
        Ok(toml::to_string(&layer)?)
    }
}
