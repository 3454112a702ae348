use crate::app::config::ConfigError;
use crate::sender::SinkError;
use thiserror::Error;

/// Top-level error type for the handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Only surfaced when the handler runs with `raise_on_index_exc`.
    #[error("Indexing failed: {0}")]
    Indexing(#[from] SinkError),

    #[error("Handler is closed")]
    Closed,

    #[error("Failed to start flush timer thread: {0}")]
    TimerSpawn(#[source] std::io::Error),
}
