use super::field::{FieldMap, FieldValue};
use super::log_level::LogLevel;
use chrono::{DateTime, Utc};
use std::backtrace::{Backtrace, BacktraceStatus};
use std::error::Error as StdError;
use std::fmt::Write as _;
use std::path::Path;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// A single log event as produced by the logging framework.
///
/// Every attribute is optional so that partial producers (bridges, tests)
/// can hand over only what they know; the mapper only writes the document
/// paths for attributes that are present.
#[derive(Debug, Clone, Default)]
pub struct LogEvent {
    pub timestamp: Option<DateTime<Utc>>,
    pub level: Option<LogLevel>,
    pub logger: Option<String>,
    pub message: Option<String>,
    pub origin: SourceLocation,
    pub process: Option<ProcessInfo>,
    pub thread: Option<ThreadInfo>,
    pub error: Option<ErrorInfo>,
    /// Positional call arguments, stringified element-wise by the mapper.
    pub args: Option<Vec<FieldValue>>,
    /// Application-supplied extra key/value pairs.
    pub extras: FieldMap,
}

impl LogEvent {
    /// Creates an event stamped with the current time, process and thread.
    pub fn new(level: LogLevel, logger: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            level: Some(level),
            logger: Some(logger.into()),
            message: Some(message.into()),
            origin: SourceLocation::default(),
            process: Some(ProcessInfo::current()),
            thread: Some(ThreadInfo::current()),
            error: None,
            args: None,
            extras: FieldMap::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_origin(mut self, origin: SourceLocation) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FieldValue>,
    {
        self.args = Some(args.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }
}

/// Where in the source the event was produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceLocation {
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub module: Option<String>,
}

impl SourceLocation {
    /// Builds a location from a file path, deriving the file name.
    pub fn from_path(path: &str, line: Option<u32>) -> Self {
        let file_name = Path::new(path)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
        Self {
            file_name,
            file_path: Some(path.to_string()),
            line,
            function: None,
            module: None,
        }
    }

    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    pub fn with_function(mut self, function: impl Into<String>) -> Self {
        self.function = Some(function.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: Option<String>,
}

impl ProcessInfo {
    /// The running process. Resolved once and cached.
    pub fn current() -> Self {
        static CURRENT: OnceLock<ProcessInfo> = OnceLock::new();
        CURRENT
            .get_or_init(|| {
                let name = std::env::current_exe().ok().and_then(|exe| {
                    exe.file_stem()
                        .map(|stem| stem.to_string_lossy().into_owned())
                });
                ProcessInfo {
                    pid: std::process::id(),
                    name,
                }
            })
            .clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: u64,
    pub name: Option<String>,
}

impl ThreadInfo {
    pub fn current() -> Self {
        let thread = std::thread::current();
        Self {
            id: THREAD_ID.with(|id| *id),
            name: thread.name().map(str::to_string),
        }
    }
}

// ThreadId has no stable numeric accessor, so ids come from a process-wide counter.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Assigned on first use; stable for the thread's lifetime.
    static THREAD_ID: u64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Error details attached to an event, written to the `error` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub type_name: String,
    pub message: String,
    pub stack_trace: String,
}

impl ErrorInfo {
    pub fn new(
        type_name: impl Into<String>,
        message: impl Into<String>,
        stack_trace: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            stack_trace: stack_trace.into(),
        }
    }

    /// Captures a typed error together with its source chain and a backtrace
    /// of the capturing thread.
    pub fn capture<E>(error: &E) -> Self
    where
        E: StdError + 'static,
    {
        Self::from_dyn(short_type_name(std::any::type_name::<E>()), error)
    }

    /// Captures an error whose concrete type is not known statically.
    pub fn from_dyn(type_name: impl Into<String>, error: &(dyn StdError + 'static)) -> Self {
        let type_name = type_name.into();
        let message = error.to_string();
        let stack_trace = render_stack_trace(&type_name, error, &Backtrace::force_capture());
        Self {
            type_name,
            message,
            stack_trace,
        }
    }
}

/// `my_app::math::ZeroDivisionError<T>` -> `ZeroDivisionError`
pub fn short_type_name(full: &str) -> String {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_string()
}

fn render_stack_trace(
    type_name: &str,
    error: &(dyn StdError + 'static),
    backtrace: &Backtrace,
) -> String {
    let mut rendered = format!("{type_name}: {error}\n");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(rendered, "Caused by: {cause}");
        source = cause.source();
    }
    if backtrace.status() == BacktraceStatus::Captured {
        let _ = write!(rendered, "stack backtrace:\n{backtrace}");
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Outer(std::num::ParseIntError);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("could not read counter")
        }
    }

    impl StdError for Outer {
        fn source(&self) -> Option<&(dyn StdError + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_capture_renders_source_chain() {
        let inner = "x1".parse::<i32>().unwrap_err();
        let info = ErrorInfo::capture(&Outer(inner));

        assert_eq!(info.type_name, "Outer");
        assert_eq!(info.message, "could not read counter");
        assert!(info.stack_trace.starts_with("Outer: could not read counter\n"));
        assert!(info.stack_trace.contains("Caused by: invalid digit found in string"));
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name("a::b::Thing<c::D>"), "Thing");
        assert_eq!(short_type_name("Plain"), "Plain");
    }

    #[test]
    fn test_source_location_from_path() {
        let location =
            SourceLocation::from_path("src/app/service.rs", Some(12)).with_module("app::service");
        assert_eq!(location.file_name.as_deref(), Some("service.rs"));
        assert_eq!(location.line, Some(12));
        assert_eq!(location.module.as_deref(), Some("app::service"));
    }

    #[test]
    fn test_thread_info_has_numeric_id() {
        let info = ThreadInfo::current();
        assert!(info.id > 0);
    }

    #[test]
    fn test_thread_ids_stable_per_thread_and_distinct_across() {
        let here = ThreadInfo::current().id;
        assert_eq!(ThreadInfo::current().id, here);

        let other = std::thread::spawn(|| ThreadInfo::current().id).join().unwrap();
        assert!(other > 0);
        assert_ne!(other, here);
    }
}
