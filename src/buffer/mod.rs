pub mod scheduler;
pub mod stats;
pub mod timer;

pub use scheduler::{FlushOutcome, FlushScheduler};
pub use stats::{FlushStats, FlushStatsSnapshot};
pub use timer::FlushTimer;

use crate::app::config::{ConfigError, HandlerConfig};
use std::time::Duration;

/// When and how batches leave the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlushPolicy {
    pub buffer_size: usize,
    pub flush_interval: Duration,
    /// Return indexing failures to the caller instead of dropping them.
    pub raise_on_error: bool,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            flush_interval: Duration::from_secs(1),
            raise_on_error: false,
        }
    }
}

impl FlushPolicy {
    pub fn from_config(config: &HandlerConfig) -> Result<Self, ConfigError> {
        config.validate_buffering()?;
        Ok(Self {
            buffer_size: config.buffer_size,
            flush_interval: config.flush_interval()?,
            raise_on_error: config.raise_on_index_exc,
        })
    }
}
