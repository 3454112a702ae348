pub mod tracing_layer;

pub use tracing_layer::{DEFAULT_IGNORED_TARGETS, SearchLayer};
