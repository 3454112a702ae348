use super::{ConfigError, ConnectionConfig, HandlerConfig};
use crate::index::validate_date_format;
use url::Url;

impl HandlerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;
        self.validate_buffering()?;

        if self.index_name.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "Index name must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// The subset of checks that does not involve the connection, used when
    /// a caller supplies its own sink.
    pub fn validate_buffering(&self) -> Result<(), ConfigError> {
        if self.buffer_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        self.flush_interval()?;
        validate_date_format(&self.index_date_format)?;
        Ok(())
    }
}

impl ConnectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::MissingConnection);
        }

        for host in &self.hosts {
            parse_host(host)?;
        }

        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Request timeout must be greater than 0".to_string(),
            ));
        }

        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "Connection timeout must be greater than 0".to_string(),
            ));
        }

        if self.password.is_some() && self.username.is_none() {
            return Err(ConfigError::InvalidConfig(
                "Password given without a username".to_string(),
            ));
        }

        Ok(())
    }

    pub fn parsed_hosts(&self) -> Result<Vec<Url>, ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::MissingConnection);
        }
        self.hosts.iter().map(|host| parse_host(host)).collect()
    }
}

/// Parses a datastore base URL. The path always ends with `/` so that
/// endpoint paths can be joined onto it.
pub fn parse_host(raw: &str) -> Result<Url, ConfigError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid host URL '{raw}': {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl(format!(
            "Unsupported scheme '{}' in host '{raw}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }

    Ok(url)
}
