use crate::app::config::HandlerConfig;
use crate::domain::{
    ErrorInfo, FieldMap, FieldValue, HandlerError, LogEvent, ProcessInfo, SourceLocation,
    ThreadInfo,
};
use crate::handler::SearchHandler;
use crate::sender::{BulkSink, ElasticsearchSink};
use chrono::Utc;
use std::cell::Cell;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Metadata, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Targets whose events are never shipped: this crate and the HTTP stack it
/// sends through. Shipping those would log into itself.
pub const DEFAULT_IGNORED_TARGETS: &[&str] = &[
    "ecs_log_shipper",
    "reqwest",
    "hyper",
    "hyper_util",
    "h2",
    "rustls",
    "tokio",
    "tower",
    "want",
    "mio",
];

thread_local! {
    static EMITTING: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside `emit` until dropped.
struct EmitGuard;

impl EmitGuard {
    fn enter() -> Option<Self> {
        EMITTING.with(|flag| {
            if flag.get() {
                None
            } else {
                flag.set(true);
                Some(EmitGuard)
            }
        })
    }
}

impl Drop for EmitGuard {
    fn drop(&mut self) {
        EMITTING.with(|flag| flag.set(false));
    }
}

/// `tracing_subscriber` layer feeding every event into a [`SearchHandler`].
pub struct SearchLayer<S: BulkSink + 'static = ElasticsearchSink> {
    handler: Arc<SearchHandler<S>>,
    ignored_targets: Vec<String>,
}

impl SearchLayer<ElasticsearchSink> {
    pub fn from_config(config: &HandlerConfig) -> Result<Self, HandlerError> {
        Ok(Self::new(Arc::new(SearchHandler::new(config)?)))
    }
}

impl<S: BulkSink + 'static> SearchLayer<S> {
    pub fn new(handler: Arc<SearchHandler<S>>) -> Self {
        Self {
            handler,
            ignored_targets: DEFAULT_IGNORED_TARGETS.iter().map(|t| t.to_string()).collect(),
        }
    }

    /// Also drop events whose target is `target` or one of its submodules.
    pub fn ignore_target(mut self, target: impl Into<String>) -> Self {
        self.ignored_targets.push(target.into());
        self
    }

    pub fn handler(&self) -> &Arc<SearchHandler<S>> {
        &self.handler
    }

    fn is_ignored(&self, target: &str) -> bool {
        self.ignored_targets.iter().any(|ignored| {
            target == ignored
                || target
                    .strip_prefix(ignored.as_str())
                    .is_some_and(|rest| rest.starts_with("::"))
        })
    }
}

impl<S, Sub> Layer<Sub> for SearchLayer<S>
where
    S: BulkSink + 'static,
    Sub: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, Sub>) {
        let metadata = event.metadata();
        if self.is_ignored(metadata.target()) {
            return;
        }
        let Some(_guard) = EmitGuard::enter() else {
            return;
        };

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        match self.handler.emit(visitor.into_log_event(metadata)) {
            Ok(()) | Err(HandlerError::Closed) => {}
            // A layer has no caller to hand the error to.
            Err(e) => eprintln!("ecs-log-shipper: {e}"),
        }
    }
}

#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    error: Option<ErrorInfo>,
    fields: FieldMap,
}

impl EventVisitor {
    fn insert(&mut self, field: &Field, value: FieldValue) {
        self.fields.insert(field.name().to_string(), value);
    }

    fn into_log_event(self, metadata: &Metadata<'_>) -> LogEvent {
        let mut origin = match metadata.file() {
            Some(file) => SourceLocation::from_path(file, metadata.line()),
            None => SourceLocation::default(),
        };
        origin.module = metadata.module_path().map(str::to_string);

        LogEvent {
            timestamp: Some(Utc::now()),
            level: Some((*metadata.level()).into()),
            logger: Some(metadata.target().to_string()),
            message: self.message,
            origin,
            process: Some(ProcessInfo::current()),
            thread: Some(ThreadInfo::current()),
            error: self.error,
            args: None,
            extras: self.fields,
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.insert(field, FieldValue::Str(rendered));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.insert(field, value.into());
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn StdError + 'static)) {
        if self.error.is_some() {
            self.insert(field, FieldValue::Str(value.to_string()));
            return;
        }
        self.error = Some(ErrorInfo::from_dyn(debug_type_name(value), value));
    }
}

/// Best guess at an error's type name from its `Debug` output, which for
/// derived impls starts with the type (or variant) name.
fn debug_type_name(error: &dyn StdError) -> String {
    let rendered = format!("{error:?}");
    let name: String = rendered
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        "Error".to_string()
    } else {
        name
    }
}
