pub mod groups;
mod handler;
pub mod serde_helpers;
mod validation;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No connection hosts configured")]
    MissingConnection,
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("File error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Environment error: {0}")]
    EnvError(String),
}

pub use groups::{ConnectionConfig, EnvField};
pub use handler::{CONFIG_ENV_VAR, HandlerConfig};
pub use validation::parse_host;
