//! Sink configuration.
//!
//! Values are layered with `figment`:
//! 1. Built-in defaults
//! 2. `matsink.toml` in the working directory (optional)
//! 3. Environment variables prefixed with `MATSINK_`, nested keys separated
//!    by `__` (e.g. `MATSINK_MEMORY__MAX_ROWS=5000`)
//!
//! # Example
//!
//! ```toml
//! [memory]
//! max_rows = 100000
//! max_bytes = 16777216
//!
//! [disk]
//! spill_dir = "/var/tmp/matsink"
//!
//! [keys]
//! max_key_columns = 16
//! ```

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default configuration file name.
pub const CONFIG_FILE_NAME: &str = "matsink.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "MATSINK_";

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The layered sources could not be merged or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(Box<figment::Error>),

    /// A value is out of range.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The configuration could not be rendered back to TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// Top-level sink configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// In-memory tier limits.
    pub memory: MemoryConfig,
    /// On-disk tier settings.
    pub disk: DiskConfig,
    /// Unique key limits of the storage engine.
    pub keys: KeyConfig,
    /// Diagnostics.
    pub logging: LoggingConfig,
}

/// Limits of the in-memory tier. Exceeding either one triggers promotion.
///
/// These bound the stored rows only. Outside them, a promoted table keeps
/// about 40 bytes of index per row (offset, key hash, candidate list), and a
/// sink using the hash column strategy remembers 8 bytes per written row
/// until the next reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Maximum number of rows held in memory.
    pub max_rows: usize,
    /// Maximum estimated row bytes held in memory.
    pub max_bytes: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_rows: 1_000_000,
            max_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Settings of the on-disk tier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Directory for spill files. `None` uses the system temp directory.
    pub spill_dir: Option<PathBuf>,
    /// Maximum bytes a single spill file may hold. `None` is unbounded.
    pub max_bytes: Option<u64>,
}

/// Unique key limits. A key over the visible columns that does not fit these
/// limits is replaced by a synthetic hash column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    /// Maximum number of columns in a unique key.
    pub max_key_columns: usize,
    /// Maximum encoded width of a unique key in bytes.
    pub max_key_bytes: usize,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            max_key_columns: 16,
            max_key_bytes: 3072,
        }
    }
}

/// Diagnostics settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Promotions slower than this are logged at `warn`.
    pub slow_promotion_ms: u64,
    /// Emit a `trace` event for every discarded duplicate row.
    pub trace_discards: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            slow_promotion_ms: 100,
            trace_discards: false,
        }
    }
}

impl SinkConfig {
    /// Loads configuration from defaults, `matsink.toml` and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(CONFIG_FILE_NAME)
    }

    /// Loads configuration using `path` as the TOML layer.
    ///
    /// A missing file is not an error; the layer is simply empty.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::from_figment(&figment)
    }

    /// Extracts and validates a configuration from an arbitrary figment.
    pub fn from_figment(figment: &Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document on top of the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigError> {
        let figment =
            Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml));
        Self::from_figment(&figment)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.max_rows == 0 {
            return Err(ConfigError::Invalid(
                "memory.max_rows must be greater than 0".to_string(),
            ));
        }
        if self.memory.max_bytes == 0 {
            return Err(ConfigError::Invalid(
                "memory.max_bytes must be greater than 0".to_string(),
            ));
        }
        if self.disk.max_bytes == Some(0) {
            return Err(ConfigError::Invalid(
                "disk.max_bytes must be greater than 0 when set".to_string(),
            ));
        }
        if self.keys.max_key_columns == 0 {
            return Err(ConfigError::Invalid(
                "keys.max_key_columns must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}
