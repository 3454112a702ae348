use super::groups::{ConnectionConfig, EnvField};
use super::serde_helpers::{load_env_list, load_env_string, load_env_string_opt, load_env_var};
use super::ConfigError;
use crate::index::{DEFAULT_DATE_FORMAT, DEFAULT_SEPARATOR, Rotation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Holds a whole TOML configuration document; takes precedence over the
/// individual `ECS_LOG_*` variables as the base layer.
pub const CONFIG_ENV_VAR: &str = "ECS_LOG_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// Index basename, or the data stream name.
    pub index_name: String,
    pub index_rotate: Rotation,
    pub index_date_format: String,
    pub index_name_sep: String,
    /// Documents buffered before a flush is forced.
    pub buffer_size: usize,
    /// Maximum time a document waits in the buffer, in seconds.
    pub flush_frequency_secs: f64,
    /// Static fields merged into every document.
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
    /// Fields resolved from environment variables for every document.
    pub extra_fields_from_env: BTreeMap<String, EnvField>,
    /// Surface indexing failures to the caller instead of dropping the batch.
    pub raise_on_index_exc: bool,
    pub is_data_stream: bool,
    pub connection: ConnectionConfig,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            index_name: "rust-logs".to_string(),
            index_rotate: Rotation::Daily,
            index_date_format: DEFAULT_DATE_FORMAT.to_string(),
            index_name_sep: DEFAULT_SEPARATOR.to_string(),
            buffer_size: 1000,
            flush_frequency_secs: 1.0,
            extra_fields: serde_json::Map::new(),
            extra_fields_from_env: BTreeMap::new(),
            raise_on_index_exc: false,
            is_data_stream: false,
            connection: ConnectionConfig::default(),
        }
    }
}

impl HandlerConfig {
    pub fn for_hosts<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            connection: ConnectionConfig::new(hosts),
            ..Self::default()
        }
    }

    /// Flush interval as a `Duration`; errors for zero, negative or
    /// non-finite values.
    pub fn flush_interval(&self) -> Result<Duration, ConfigError> {
        let secs = self.flush_frequency_secs;
        if !secs.is_finite() || secs <= 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "Flush frequency must be a positive number of seconds, got {secs}"
            )));
        }
        Duration::try_from_secs_f64(secs).map_err(|e| {
            ConfigError::InvalidConfig(format!("Flush frequency {secs} out of range: {e}"))
        })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_ENV_VAR) {
            Ok(content) => Self::from_toml(&content)?,
            Err(_) => Self::default(),
        };

        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays the `ECS_LOG_*` environment variables onto this config.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        load_env_string("ECS_LOG_INDEX_NAME", &mut self.index_name);
        load_env_var("ECS_LOG_INDEX_ROTATE", &mut self.index_rotate)?;
        load_env_string("ECS_LOG_INDEX_DATE_FORMAT", &mut self.index_date_format);
        load_env_string("ECS_LOG_INDEX_NAME_SEP", &mut self.index_name_sep);
        load_env_var("ECS_LOG_BUFFER_SIZE", &mut self.buffer_size)?;
        load_env_var("ECS_LOG_FLUSH_FREQUENCY_SECS", &mut self.flush_frequency_secs)?;
        load_env_var("ECS_LOG_RAISE_ON_INDEX_EXC", &mut self.raise_on_index_exc)?;
        load_env_var("ECS_LOG_IS_DATA_STREAM", &mut self.is_data_stream)?;

        let connection = &mut self.connection;
        load_env_list("ECS_LOG_HOSTS", &mut connection.hosts);
        load_env_string_opt("ECS_LOG_USERNAME", &mut connection.username);
        load_env_string_opt("ECS_LOG_PASSWORD", &mut connection.password);
        load_env_string_opt("ECS_LOG_API_KEY", &mut connection.api_key);
        load_env_var("ECS_LOG_TIMEOUT_SECS", &mut connection.timeout_secs)?;
        load_env_var("ECS_LOG_CONNECT_TIMEOUT_SECS", &mut connection.connect_timeout_secs)?;
        load_env_var("ECS_LOG_COMPRESSION", &mut connection.compression)?;

        Ok(())
    }
}
