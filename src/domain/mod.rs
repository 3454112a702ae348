//! Domain layer for ecs-log-shipper.
//!
//! Contains the canonical types shared across all modules:
//! - `LogEvent`: what the logging framework hands to the handler
//! - `Document`: the ECS-shaped unit that gets buffered and indexed
//! - `FieldValue` / `FieldMap`: open-ended field values
//! - `LogLevel`: event severity
//! - `HandlerError`: top-level error type

pub mod document;
pub mod error;
pub mod event;
pub mod field;
pub mod log_level;

pub use document::Document;
pub use error::HandlerError;
pub use event::{ErrorInfo, LogEvent, ProcessInfo, SourceLocation, ThreadInfo};
pub use field::{FieldMap, FieldValue};
pub use log_level::LogLevel;
