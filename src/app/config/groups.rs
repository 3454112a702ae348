use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// How to reach the datastore.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub hosts: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Sent as `Authorization: ApiKey ...`; takes precedence over basic auth.
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Gzip request bodies.
    pub compression: bool,
    pub user_agent: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            hosts: Vec::new(),
            username: None,
            password: None,
            api_key: None,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            compression: false,
            user_agent: format!("ecs-log-shipper/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ConnectionConfig {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// Credentials stay out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("hosts", &self.hosts)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("compression", &self.compression)
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

/// Leaf of the `extra_fields_from_env` tree: either the name of an
/// environment variable or a further level of nesting.
///
/// ```toml
/// [extra_fields_from_env]
/// App = "APP_NAME"
/// Nested = { One = "APP_NESTED_ONE" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvField {
    Var(String),
    Nested(BTreeMap<String, EnvField>),
}

impl EnvField {
    pub fn nested<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, EnvField)>,
        K: Into<String>,
    {
        EnvField::Nested(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn var(name: impl Into<String>) -> Self {
        EnvField::Var(name.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_credentials() {
        let config = ConnectionConfig {
            username: Some("elastic".to_string()),
            password: Some("changeme".to_string()),
            api_key: Some("c2VjcmV0".to_string()),
            ..ConnectionConfig::new(["http://localhost:9200"])
        };

        let rendered = format!("{config:?}");
        assert!(rendered.contains("elastic"));
        assert!(!rendered.contains("changeme"));
        assert!(!rendered.contains("c2VjcmV0"));
    }

    #[test]
    fn test_env_field_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            fields: BTreeMap<String, EnvField>,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            [fields]
            App = "APP_NAME"
            Nested = { One = "APP_ONE" }
            "#,
        )
        .unwrap();

        assert_eq!(parsed.fields["App"], EnvField::var("APP_NAME"));
        assert_eq!(
            parsed.fields["Nested"],
            EnvField::nested([("One", EnvField::var("APP_ONE"))])
        );
    }
}
