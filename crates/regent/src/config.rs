//! Runtime configuration.
//!
//! Configuration is built programmatically or read from the environment and
//! installed once per process with [`crate::init`].
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `REGENT_LOG` | Log level (error/warn/info/debug/trace) | info |
//! | `REGENT_REGION_CHUNK_SIZE` | Initial chunk size of a region's arena, in bytes | 8192 |
//!
//! # Example
//!
//! ```
//! use regent::config::RuntimeConfig;
//! use regent_log::Level;
//!
//! let config = RuntimeConfig::builder()
//!     .log_level(Level::Warn)
//!     .region_chunk_size(16 * 1024)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(config.region_chunk_size, 16 * 1024);
//! ```

use regent_log::Level;
use std::env;
use std::fmt;
use std::sync::OnceLock;

/// Smallest accepted region chunk size.
pub const MIN_REGION_CHUNK_SIZE: usize = 4096;

/// Environment variable holding the log level.
pub const LOG_ENV: &str = "REGENT_LOG";

/// Environment variable holding the region chunk size.
pub const REGION_CHUNK_SIZE_ENV: &str = "REGENT_REGION_CHUNK_SIZE";

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Minimum level of emitted log records.
    pub log_level: Level,
    /// Initial chunk size, in bytes, of the arena behind each new region.
    pub region_chunk_size: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: Level::Info,
            region_chunk_size: 8192,
        }
    }
}

impl RuntimeConfig {
    /// Returns a builder starting from the defaults.
    #[must_use]
    pub fn builder() -> RuntimeConfigBuilder {
        RuntimeConfigBuilder::new()
    }

    /// Reads the configuration from `REGENT_*` environment variables.
    /// Unset variables keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is set to an unparseable value
    /// or the result fails [`RuntimeConfig::validate`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(value) = env::var(LOG_ENV) {
            config.log_level = value
                .parse()
                .map_err(|_| ConfigError::InvalidLogLevel(value))?;
        }

        if let Ok(value) = env::var(REGION_CHUNK_SIZE_ENV) {
            config.region_chunk_size = value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidNumber {
                    var: REGION_CHUNK_SIZE_ENV,
                    value,
                })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the runtime cannot use.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidChunkSize`] if the region chunk size is
    /// below [`MIN_REGION_CHUNK_SIZE`] or not a power of two.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region_chunk_size < MIN_REGION_CHUNK_SIZE
            || !self.region_chunk_size.is_power_of_two()
        {
            return Err(ConfigError::InvalidChunkSize(self.region_chunk_size));
        }
        Ok(())
    }
}

/// Builder for [`RuntimeConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuntimeConfigBuilder {
    config: RuntimeConfig,
}

impl RuntimeConfigBuilder {
    /// Creates a builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level.
    #[must_use]
    pub fn log_level(mut self, level: Level) -> Self {
        self.config.log_level = level;
        self
    }

    /// Sets the initial chunk size of region arenas.
    #[must_use]
    pub fn region_chunk_size(mut self, size: usize) -> Self {
        self.config.region_chunk_size = size;
        self
    }

    /// Validates and returns the configuration.
    ///
    /// # Errors
    ///
    /// See [`RuntimeConfig::validate`].
    pub fn build(self) -> Result<RuntimeConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Region chunk size is too small or not a power of two.
    InvalidChunkSize(usize),
    /// The log level variable does not name a level.
    InvalidLogLevel(String),
    /// A numeric variable does not hold a number.
    InvalidNumber {
        /// The variable name.
        var: &'static str,
        /// The value found.
        value: String,
    },
    /// [`crate::init`] was called more than once.
    AlreadyInitialized,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidChunkSize(size) => write!(
                f,
                "Invalid region chunk size {size}: must be a power of two of at least {MIN_REGION_CHUNK_SIZE}"
            ),
            ConfigError::InvalidLogLevel(value) => write!(f, "Invalid log level: {value}"),
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "Invalid value for {var}: {value}")
            }
            ConfigError::AlreadyInitialized => write!(f, "Runtime already initialized"),
        }
    }
}

impl std::error::Error for ConfigError {}

static INSTALLED: OnceLock<RuntimeConfig> = OnceLock::new();

pub(crate) fn install(config: RuntimeConfig) -> Result<&'static RuntimeConfig, ConfigError> {
    config.validate()?;
    let mut fresh = false;
    let installed = INSTALLED.get_or_init(|| {
        fresh = true;
        config
    });
    if fresh {
        Ok(installed)
    } else {
        Err(ConfigError::AlreadyInitialized)
    }
}

/// Returns the installed configuration, or the defaults if
/// [`crate::init`] has not been called.
pub fn current() -> &'static RuntimeConfig {
    static DEFAULT: OnceLock<RuntimeConfig> = OnceLock::new();
    INSTALLED
        .get()
        .unwrap_or_else(|| DEFAULT.get_or_init(RuntimeConfig::default))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();
        assert_eq!(config.log_level, Level::Info);
        assert_eq!(config.region_chunk_size, 8192);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::builder()
            .log_level(Level::Trace)
            .region_chunk_size(65536)
            .build()
            .unwrap();

        assert_eq!(config.log_level, Level::Trace);
        assert_eq!(config.region_chunk_size, 65536);
    }

    #[test]
    fn test_builder_rejects_small_chunks() {
        let result = RuntimeConfig::builder().region_chunk_size(1024).build();
        assert_eq!(result, Err(ConfigError::InvalidChunkSize(1024)));
    }

    #[test]
    fn test_builder_rejects_non_power_of_two() {
        let result = RuntimeConfig::builder().region_chunk_size(5000).build();
        assert_eq!(result, Err(ConfigError::InvalidChunkSize(5000)));
    }

    #[test]
    fn test_config_error_display() {
        assert_eq!(
            ConfigError::InvalidChunkSize(10).to_string(),
            "Invalid region chunk size 10: must be a power of two of at least 4096"
        );
        assert_eq!(
            ConfigError::InvalidNumber { var: REGION_CHUNK_SIZE_ENV, value: "big".into() }
                .to_string(),
            "Invalid value for REGENT_REGION_CHUNK_SIZE: big"
        );
    }

    #[test]
    fn test_current_falls_back_to_default() {
        let config = current();
        assert!(config.validate().is_ok());
    }
}
