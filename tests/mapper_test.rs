use ecs_log_shipper::app::config::EnvField;
use ecs_log_shipper::mapper::EnvLookup;
use ecs_log_shipper::sender::encode;
use ecs_log_shipper::{
    DocumentMapper, ErrorInfo, FieldValue, HandlerConfig, LogEvent, LogLevel, StaticMetadata,
};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("division by zero")]
struct ZeroDivisionError;

fn divide(a: i64, b: i64) -> Result<i64, ZeroDivisionError> {
    if b == 0 {
        return Err(ZeroDivisionError);
    }
    Ok(a / b)
}

fn metadata() -> StaticMetadata {
    StaticMetadata::with_host("mapper-host", "10.1.2.3")
}

fn plain_mapper() -> DocumentMapper {
    DocumentMapper::from_config(&HandlerConfig::default(), &metadata())
}

#[test]
fn test_error_block_from_caught_error() {
    let err = divide(1, 0).unwrap_err();
    let event = LogEvent::new(LogLevel::Error, "math", "calculation failed")
        .with_error(ErrorInfo::capture(&err));

    let doc = plain_mapper().map(event);

    assert_eq!(doc.get_str("error.type"), Some("ZeroDivisionError"));
    assert_eq!(doc.get_str("error.code"), Some("ZeroDivisionError"));
    assert_eq!(doc.get_str("error.message"), Some("division by zero"));
    let trace = doc.get_str("error.stack_trace").unwrap();
    assert!(!trace.is_empty());
    assert!(trace.starts_with("ZeroDivisionError: division by zero"));
    assert!(matches!(doc.get("error.id"), Some(FieldValue::Uuid(_))));
}

#[test]
fn test_error_ids_are_fresh_per_document() {
    let err = divide(1, 0).unwrap_err();
    let mapper = plain_mapper();
    let event =
        LogEvent::new(LogLevel::Error, "math", "failed").with_error(ErrorInfo::capture(&err));

    let first = mapper.map(event.clone());
    let second = mapper.map(event);
    assert_ne!(first.get("error.id"), second.get("error.id"));
}

#[test]
fn test_no_error_block_without_error() {
    let doc = plain_mapper().map(LogEvent::new(LogLevel::Info, "app", "fine"));
    assert!(!doc.contains("error"));
}

#[test]
fn test_env_overrides_keep_untouched_nested_keys() {
    let mut config = HandlerConfig::default();
    config.extra_fields = json!({"App": "X", "Nested": {"One": "1"}})
        .as_object()
        .cloned()
        .unwrap();
    config.extra_fields_from_env.insert("App".to_string(), EnvField::var("APP_NAME"));
    config.extra_fields_from_env.insert(
        "Nested".to_string(),
        EnvField::nested([("Two", EnvField::var("NESTED_TWO"))]),
    );

    let lookup: EnvLookup = Arc::new(|name: &str| match name {
        "APP_NAME" => Some("billing".to_string()),
        "NESTED_TWO" => Some("2".to_string()),
        _ => None,
    });
    let mapper = DocumentMapper::from_config(&config, &metadata()).with_env_lookup(lookup);

    let doc = mapper.map(LogEvent::new(LogLevel::Info, "app", "hello"));

    assert_eq!(doc.get_str("App"), Some("billing"));
    assert_eq!(doc.get_str("Nested.One"), Some("1"));
    assert_eq!(doc.get_str("Nested.Two"), Some("2"));

    // The template itself is never touched by mapping.
    assert_eq!(mapper.template().get("App"), Some(&FieldValue::from("X")));
}

#[test]
fn test_unset_env_vars_leave_template_values() {
    let mut config = HandlerConfig::default();
    config.extra_fields.insert("App".to_string(), json!("X"));
    config.extra_fields_from_env.insert("App".to_string(), EnvField::var("UNSET_VAR"));

    let lookup: EnvLookup = Arc::new(|_: &str| None);
    let mapper = DocumentMapper::from_config(&config, &metadata()).with_env_lookup(lookup);

    let doc = mapper.map(LogEvent::new(LogLevel::Info, "app", "hello"));
    assert_eq!(doc.get_str("App"), Some("X"));
}

#[test]
fn test_extras_copied_and_nulls_normalized() {
    let event = LogEvent::new(LogLevel::Info, "app", "hello")
        .with_extra("user_id", 42)
        .with_extra("cart", FieldValue::Null)
        .with_extra("ratio", 0.5);

    let doc = plain_mapper().map(event);

    assert_eq!(doc.get("user_id"), Some(&FieldValue::Int(42)));
    assert_eq!(doc.get_str("cart"), Some(""));
    assert_eq!(doc.get("ratio"), Some(&FieldValue::Float(0.5)));
}

#[test]
fn test_deny_listed_extras_dropped() {
    let event = LogEvent::new(LogLevel::Info, "app", "hello")
        .with_extra("msecs", 12.5)
        .with_extra("relativeCreated", 1000.0)
        .with_extra("levelno", 20)
        .with_extra("exc_text", "rendered")
        .with_extra("msg", "template %s");

    let doc = plain_mapper().map(event);

    for key in ["msecs", "relativeCreated", "levelno", "exc_text", "msg"] {
        assert!(!doc.contains(key), "{key} should be filtered");
    }
}

#[test]
fn test_extras_cannot_replace_reserved_fields() {
    let event = LogEvent::new(LogLevel::Info, "app", "real message")
        .with_extra("message", "spoofed")
        .with_extra("host", "spoofed");

    let doc = plain_mapper().map(event);

    assert_eq!(doc.get_str("message"), Some("real message"));
    assert_eq!(doc.get_str("host.hostname"), Some("mapper-host"));
}

#[test]
fn test_args_are_stringified() {
    let event = LogEvent::new(LogLevel::Info, "app", "%s bought %d")
        .with_args([FieldValue::from("alice"), FieldValue::from(3)]);

    let doc = plain_mapper().map(event);

    let args = doc.get("args").and_then(FieldValue::as_list).unwrap();
    assert_eq!(args, &[FieldValue::from("alice"), FieldValue::from("3")]);
}

#[test]
fn test_extras_cannot_replace_positional_args() {
    let event = LogEvent::new(LogLevel::Info, "app", "%s logged in")
        .with_args([FieldValue::from("alice")])
        .with_extra("args", "spoofed");

    let doc = plain_mapper().map(event);
    let args = doc.get("args").and_then(FieldValue::as_list).unwrap();
    assert_eq!(args, &[FieldValue::from("alice")]);

    // Without positional args the key is free for extras.
    let doc = plain_mapper().map(
        LogEvent::new(LogLevel::Info, "app", "hello").with_extra("args", "from extras"),
    );
    assert_eq!(doc.get_str("args"), Some("from extras"));
}

#[test]
fn test_static_metadata_on_every_document() {
    let mapper = plain_mapper();
    let first = mapper.map(LogEvent::new(LogLevel::Info, "app", "one"));
    let second = mapper.map(LogEvent::new(LogLevel::Info, "app", "two"));

    assert_eq!(first.get_str("agent.type"), Some("ecs-log-shipper"));
    assert_eq!(first.get_str("host.ip"), Some("10.1.2.3"));
    assert_eq!(first.get("agent.ephemeral_id"), second.get("agent.ephemeral_id"));
}

struct Decimal(&'static str);

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

#[test]
fn test_unrepresentable_values_serialize_as_strings() {
    let event = LogEvent::new(LogLevel::Info, "app", "priced")
        .with_extra("price", FieldValue::display(Decimal("19.990000000000000001")))
        .with_extra("ratio", f64::NAN);

    let doc = plain_mapper().map(event);
    let encoded = serde_json::to_value(&doc).unwrap();

    assert_eq!(encoded["price"], json!("19.990000000000000001"));
    assert_eq!(encoded["ratio"], json!("NaN"));
    assert_eq!(encoded["log"]["level"], json!("INFO"));
    assert_eq!(encode(&FieldValue::display(Decimal("1.50"))), json!("1.50"));
}
