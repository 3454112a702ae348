pub mod client;
pub mod response;
pub mod serialization;

pub use client::{ClientStats, ConnectionStats, ElasticsearchSink};
pub use response::{BulkResponse, MAX_REASONS};
pub use serialization::{BulkBodySerializer, SerializationError, encode, encode_or_display};

use crate::domain::Document;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Request timeout: {0}")]
    RequestTimeout(String),
    #[error("HTTP error: {status} - {message}")]
    Http { status: u16, message: String },
    #[error("Unreadable bulk response: {0}")]
    InvalidResponse(String),
    #[error("{failed} of {total} documents rejected: {}", reasons.join("; "))]
    Rejected {
        failed: usize,
        total: usize,
        reasons: Vec<String>,
    },
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Sink worker unavailable: {0}")]
    WorkerUnavailable(String),
}

/// Bulk action used for a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    Index,
    /// Required by data streams, which are append-only.
    Create,
}

impl WriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Index => "index",
            WriteMode::Create => "create",
        }
    }
}

impl fmt::Display for WriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    pub index: String,
    pub mode: WriteMode,
    pub document: Document,
}

impl BulkOperation {
    pub fn new(index: impl Into<String>, mode: WriteMode, document: Document) -> Self {
        Self {
            index: index.into(),
            mode,
            document,
        }
    }
}

/// Outcome of one bulk request that reached the datastore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    pub total: usize,
    pub failed: usize,
    /// First few rejection reasons, for diagnostics.
    pub reasons: Vec<String>,
}

impl BulkSummary {
    pub fn success(total: usize) -> Self {
        Self {
            total,
            failed: 0,
            reasons: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> usize {
        self.total.saturating_sub(self.failed)
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// A partially rejected batch counts as a failed one.
    pub fn into_result(self) -> Result<Self, SinkError> {
        if self.has_failures() {
            Err(SinkError::Rejected {
                failed: self.failed,
                total: self.total,
                reasons: self.reasons,
            })
        } else {
            Ok(self)
        }
    }
}

/// Destination for batches of documents.
///
/// Calls are synchronous; the handler only ever has one `bulk` call in
/// flight at a time.
#[cfg_attr(test, automock)]
pub trait BulkSink: Send + Sync {
    fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary, SinkError>;

    /// Health check. Never used on the flush path.
    fn ping(&self) -> bool;
}

impl<T: BulkSink + ?Sized> BulkSink for Arc<T> {
    fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary, SinkError> {
        (**self).bulk(operations)
    }

    fn ping(&self) -> bool {
        (**self).ping()
    }
}
