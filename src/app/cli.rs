use super::config::{CONFIG_ENV_VAR, ConfigError, HandlerConfig};
use super::logging_system::TracingLevel;
use crate::domain::LogLevel;
use crate::index::Rotation;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ecs-log-shipper")]
#[command(about = "Ship ECS log documents to Elasticsearch/OpenSearch")]
#[command(version)]
pub struct Cli {
    /// TOML configuration file; replaces the ECS_LOG_CONFIG document
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Datastore URLs, comma separated
    #[arg(long, env = "ECS_LOG_HOSTS", value_delimiter = ',')]
    pub hosts: Vec<String>,

    #[arg(long)]
    pub index_name: Option<String>,

    #[arg(long, value_enum)]
    pub index_rotate: Option<Rotation>,

    /// Verbosity of this tool's own diagnostics
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: TracingLevel,

    #[arg(long)]
    pub json_logs: bool,

    /// Fail when the datastore rejects a batch
    #[arg(long)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Check that the datastore answers
    Ping,
    /// Ship test events and flush them
    Send {
        #[arg(short, long, default_value = "ecs-log-shipper test event")]
        message: String,

        #[arg(short, long, default_value = "info")]
        level: LogLevel,

        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
}

impl Cli {
    /// Layers, lowest first: file (or `ECS_LOG_CONFIG`), `ECS_LOG_*`
    /// variables, command-line flags.
    pub fn resolve_config(&self) -> Result<HandlerConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => HandlerConfig::from_toml(&std::fs::read_to_string(path)?)?,
            None => match std::env::var(CONFIG_ENV_VAR) {
                Ok(content) => HandlerConfig::from_toml(&content)?,
                Err(_) => HandlerConfig::default(),
            },
        };
        config.apply_env_overrides()?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&self, config: &mut HandlerConfig) {
        if !self.hosts.is_empty() {
            config.connection.hosts = self
                .hosts
                .iter()
                .map(|h| h.trim().to_string())
                .filter(|h| !h.is_empty())
                .collect();
        }
        if let Some(name) = &self.index_name {
            config.index_name = name.clone();
        }
        if let Some(rotation) = self.index_rotate {
            config.index_rotate = rotation;
        }
        if self.strict {
            config.raise_on_index_exc = true;
        }
    }
}
