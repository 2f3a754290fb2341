//! Configuration schema (highwater.toml) and run-time job arguments

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefix marking a setting value that is read from the environment
const ENV_PREFIX: &str = "env:";

/// What to do when the target's high-water mark cannot be read for a reason
/// other than the table not existing yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkPolicy {
    /// Fail the run with the read error
    #[default]
    Abort,

    /// Treat the failure as "no watermark" and reload the full source.
    /// Append-only targets will receive duplicates.
    FullReload,
}

impl std::fmt::Display for WatermarkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Abort => write!(f, "abort"),
            Self::FullReload => write!(f, "full_reload"),
        }
    }
}

impl std::str::FromStr for WatermarkPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "abort" => Ok(Self::Abort),
            "full_reload" => Ok(Self::FullReload),
            other => Err(ConfigError::ParseError(format!(
                "unknown watermark policy '{}', expected 'abort' or 'full_reload'",
                other
            ))),
        }
    }
}

/// A typed connector entry: `type = "..."` plus connector-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Connector type (snowflake, postgres, local, ...)
    #[serde(rename = "type")]
    pub connection_type: String,

    /// Connection settings (connector-specific)
    #[serde(flatten)]
    pub settings: BTreeMap<String, toml::Value>,
}

impl ConnectionConfig {
    pub fn new(connection_type: impl Into<String>) -> Self {
        Self {
            connection_type: connection_type.into(),
            settings: BTreeMap::new(),
        }
    }

    /// Add a string setting
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), toml::Value::String(value.into()));
        self
    }

    /// Look up a setting, resolving `env:NAME` indirection.
    ///
    /// Scalars are rendered as strings; arrays and tables are not settings.
    pub fn setting(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let raw = match self.settings.get(key) {
            None => return Ok(None),
            Some(toml::Value::String(s)) => s.clone(),
            Some(toml::Value::Integer(i)) => i.to_string(),
            Some(toml::Value::Float(f)) => f.to_string(),
            Some(toml::Value::Boolean(b)) => b.to_string(),
            Some(other) => {
                return Err(ConfigError::ParseError(format!(
                    "setting '{}' must be a scalar, found {}",
                    key,
                    other.type_str()
                )))
            }
        };

        match raw.strip_prefix(ENV_PREFIX) {
            Some(var) => std::env::var(var)
                .map(Some)
                .map_err(|_| ConfigError::MissingEnv {
                    key: key.to_string(),
                    var: var.to_string(),
                }),
            None => Ok(Some(raw)),
        }
    }

    /// Like [`ConnectionConfig::setting`] but the key must be present
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.setting(key)?.ok_or_else(|| ConfigError::MissingSetting {
            connection_type: self.connection_type.clone(),
            key: key.to_string(),
        })
    }
}

fn default_source() -> ConnectionConfig {
    ConnectionConfig::new("local").with_setting("root", "catalog")
}

/// Load behaviour knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Policy for watermark read failures
    #[serde(default)]
    pub on_watermark_error: WatermarkPolicy,

    /// Maximum rows per INSERT statement for SQL warehouses
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_batch_size() -> usize {
    1000
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            on_watermark_error: WatermarkPolicy::default(),
            batch_size: default_batch_size(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Source catalog connector
    #[serde(default = "default_source")]
    pub source: ConnectionConfig,

    /// Named target connections
    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,

    /// Load behaviour
    #[serde(default)]
    pub load: LoadConfig,

    /// Project root path (for resolving relative paths)
    #[serde(skip)]
    pub project_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source: default_source(),
            connections: BTreeMap::new(),
            load: LoadConfig::default(),
            project_root: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut config = Self::from_toml(&contents)?;

        // Set project root to parent of config file
        if let Some(parent) = path.parent() {
            config.project_root = parent.to_path_buf();
        }

        Ok(config)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let mut config: Config = toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.project_root = std::env::current_dir().unwrap_or_default();
        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Look up a named connection
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig, ConfigError> {
        self.connections
            .get(name)
            .ok_or_else(|| ConfigError::MissingConnection(name.to_string()))
    }

    /// Resolve a possibly relative path against the project root
    pub fn resolve_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }
}

/// Run-time arguments of a single load
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobArgs {
    pub job_name: String,
    pub catalog_database: String,
    pub catalog_table: String,
    pub target_table: String,
    pub connection_name: String,
    pub incremental_column: String,
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("No connection named '{0}' in configuration")]
    MissingConnection(String),

    #[error("{connection_type} connection requires '{key}'")]
    MissingSetting { connection_type: String, key: String },

    #[error("Setting '{key}' refers to unset environment variable {var}")]
    MissingEnv { key: String, var: String },
}
