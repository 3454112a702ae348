// Specific pedantic lints enforced (not blanket allow):
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
// Noisy pedantic lints suppressed with justification:
#![allow(
    clippy::cast_lossless,            // Infallible casts are clear enough with `as`
    clippy::cast_possible_truncation, // Safe within realistic value bounds (durations, sizes)
    clippy::cast_precision_loss,      // Acceptable for stats/display
    clippy::missing_errors_doc,       // Internal API
    clippy::missing_panics_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. SinkError in sender module
    clippy::must_use_candidate,       // Annotated selectively on critical APIs
    clippy::doc_markdown              // Internal API
)]

pub mod app;
pub mod buffer;
pub mod collector;
pub mod domain;
pub mod handler;
pub mod index;
pub mod mapper;
pub mod sender;

// Re-export main types for easy access
pub use app::config::{ConfigError, ConnectionConfig, HandlerConfig};
pub use buffer::{FlushOutcome, FlushPolicy, FlushStatsSnapshot};
pub use collector::SearchLayer;
pub use domain::{Document, ErrorInfo, FieldValue, HandlerError, LogEvent, LogLevel};
pub use handler::SearchHandler;
pub use index::{IndexNameResolver, Rotation};
pub use mapper::{DocumentMapper, StaticMetadata};
pub use sender::{BulkOperation, BulkSink, BulkSummary, ElasticsearchSink, SinkError, WriteMode};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
