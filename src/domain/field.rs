use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};
use std::sync::Arc;
use uuid::Uuid;

/// Nested field mapping used for documents and extra-field templates.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// A value stored in a document field.
///
/// Most variants map directly onto JSON. `Timestamp`, `Uuid` and `Display`
/// carry values JSON has no native type for; the field serializer writes
/// them in their canonical string form.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    Display(Arc<dyn fmt::Display + Send + Sync>),
    List(Vec<FieldValue>),
    Map(FieldMap),
}

impl FieldValue {
    /// Wraps any displayable value (decimals, addresses, custom types).
    pub fn display<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        FieldValue::Display(Arc::new(value))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&FieldMap> {
        match self {
            FieldValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Formats an instant the way `@timestamp` is written: UTC, millisecond
/// precision, `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Returns the map stored under `key`, creating it (or replacing a non-map
/// value) when needed.
pub fn child_map<'a>(map: &'a mut FieldMap, key: &str) -> &'a mut FieldMap {
    let slot = map
        .entry(key.to_string())
        .or_insert_with(|| FieldValue::Map(FieldMap::new()));
    if !matches!(slot, FieldValue::Map(_)) {
        *slot = FieldValue::Map(FieldMap::new());
    }
    match slot {
        FieldValue::Map(inner) => inner,
        _ => unreachable!("slot was just replaced with a map"),
    }
}

/// Walks (and creates) a chain of nested maps.
pub fn nested_map<'a>(map: &'a mut FieldMap, path: &[&str]) -> &'a mut FieldMap {
    let mut current = map;
    for key in path {
        current = child_map(current, key);
    }
    current
}

/// Deep-merges `overrides` into `target`. Nested maps are merged key by key,
/// every other value replaces what was there.
pub fn merge_fields(target: &mut FieldMap, overrides: FieldMap) {
    for (key, value) in overrides {
        match value {
            FieldValue::Map(inner) => merge_fields(child_map(target, &key), inner),
            other => {
                target.insert(key, other);
            }
        }
    }
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::Int(v) => f.debug_tuple("Int").field(v).finish(),
            FieldValue::UInt(v) => f.debug_tuple("UInt").field(v).finish(),
            FieldValue::Float(v) => f.debug_tuple("Float").field(v).finish(),
            FieldValue::Str(v) => f.debug_tuple("Str").field(v).finish(),
            FieldValue::Timestamp(v) => f.debug_tuple("Timestamp").field(v).finish(),
            FieldValue::Uuid(v) => f.debug_tuple("Uuid").field(v).finish(),
            FieldValue::Display(v) => f.debug_tuple("Display").field(&render_display(v)).finish(),
            FieldValue::List(v) => f.debug_tuple("List").field(v).finish(),
            FieldValue::Map(v) => f.debug_tuple("Map").field(v).finish(),
        }
    }
}

/// Written in place of a value whose `Display` impl fails.
pub const UNPRINTABLE: &str = "<unprintable>";

/// Renders `value` into a string, tolerating `Display` impls that return
/// `Err` (which `ToString` would turn into a panic).
pub fn render_display(value: &dyn fmt::Display) -> String {
    let mut rendered = String::new();
    if write!(rendered, "{value}").is_err() {
        return UNPRINTABLE.to_string();
    }
    rendered
}

/// Canonical human-readable form; this is also the fallback the serializer
/// uses for values without a JSON representation.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => Ok(()),
            FieldValue::Bool(v) => write!(f, "{v}"),
            FieldValue::Int(v) => write!(f, "{v}"),
            FieldValue::UInt(v) => write!(f, "{v}"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Str(v) => f.write_str(v),
            FieldValue::Timestamp(v) => f.write_str(&format_timestamp(v)),
            FieldValue::Uuid(v) => write!(f, "{}", v.hyphenated()),
            FieldValue::Display(v) => f.write_str(&render_display(v)),
            FieldValue::List(_) | FieldValue::Map(_) => match serde_json::to_string(self) {
                Ok(rendered) => f.write_str(&rendered),
                Err(_) => f.write_str(UNPRINTABLE),
            },
        }
    }
}

impl PartialEq for FieldValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FieldValue::Null, FieldValue::Null) => true,
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a == b,
            (FieldValue::Int(a), FieldValue::Int(b)) => a == b,
            (FieldValue::UInt(a), FieldValue::UInt(b)) => a == b,
            (FieldValue::Float(a), FieldValue::Float(b)) => a == b,
            (FieldValue::Str(a), FieldValue::Str(b)) => a == b,
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a == b,
            (FieldValue::Uuid(a), FieldValue::Uuid(b)) => a == b,
            (FieldValue::Display(a), FieldValue::Display(b)) => {
                render_display(a) == render_display(b)
            }
            (FieldValue::List(a), FieldValue::List(b)) => a == b,
            (FieldValue::Map(a), FieldValue::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Str(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Str(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Int(i64::from(value))
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::UInt(u64::from(value))
    }
}

impl From<u64> for FieldValue {
    fn from(value: u64) -> Self {
        FieldValue::UInt(value)
    }
}

impl From<usize> for FieldValue {
    fn from(value: usize) -> Self {
        FieldValue::UInt(value as u64)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(value)
    }
}

impl From<Uuid> for FieldValue {
    fn from(value: Uuid) -> Self {
        FieldValue::Uuid(value)
    }
}

impl From<FieldMap> for FieldValue {
    fn from(value: FieldMap) -> Self {
        FieldValue::Map(value)
    }
}

impl<T: Into<FieldValue>> From<Vec<T>> for FieldValue {
    fn from(value: Vec<T>) -> Self {
        FieldValue::List(value.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FieldValue::Null, Into::into)
    }
}

impl From<serde_json::Value> for FieldValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    FieldValue::UInt(u)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => FieldValue::Str(s),
            serde_json::Value::Array(items) => {
                FieldValue::List(items.into_iter().map(FieldValue::from).collect())
            }
            serde_json::Value::Object(map) => FieldValue::Map(
                map.into_iter()
                    .map(|(key, value)| (key, FieldValue::from(value)))
                    .collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, FieldValue)]) -> FieldMap {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_merge_fields_keeps_untouched_nested_keys() {
        let mut target = map(&[
            ("App", "Test".into()),
            ("Nested", map(&[("One", "1".into()), ("Two", "2".into())]).into()),
        ]);
        let overrides = map(&[
            ("App", "Test2".into()),
            ("Nested", map(&[("One", "One".into())]).into()),
        ]);

        merge_fields(&mut target, overrides);

        assert_eq!(target["App"], FieldValue::from("Test2"));
        let nested = target["Nested"].as_map().unwrap();
        assert_eq!(nested["One"], FieldValue::from("One"));
        assert_eq!(nested["Two"], FieldValue::from("2"));
    }

    #[test]
    fn test_child_map_replaces_scalar() {
        let mut target = map(&[("log", "not a map".into())]);
        child_map(&mut target, "log").insert("level".to_string(), "INFO".into());
        assert_eq!(
            target["log"].as_map().unwrap()["level"],
            FieldValue::from("INFO")
        );
    }

    #[test]
    fn test_nested_map_creates_path() {
        let mut target = FieldMap::new();
        nested_map(&mut target, &["log", "origin", "file"]).insert("line".to_string(), 7u32.into());

        let line = target["log"].as_map().unwrap()["origin"].as_map().unwrap()["file"]
            .as_map()
            .unwrap()["line"]
            .clone();
        assert_eq!(line, FieldValue::UInt(7));
    }

    #[test]
    fn test_display_fallbacks() {
        let ts = DateTime::parse_from_rfc3339("2021-11-08T10:04:06.122Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(FieldValue::from(ts).to_string(), "2021-11-08T10:04:06.122Z");
        assert_eq!(FieldValue::display(std::net::Ipv4Addr::LOCALHOST).to_string(), "127.0.0.1");
        assert_eq!(FieldValue::Null.to_string(), "");
    }

    #[test]
    fn test_from_json_value() {
        let value: FieldValue = serde_json::json!({"a": [1, "b", null], "c": 1.5}).into();
        let map = value.as_map().unwrap();
        assert_eq!(
            map["a"],
            FieldValue::List(vec![FieldValue::Int(1), "b".into(), FieldValue::Null])
        );
        assert_eq!(map["c"], FieldValue::Float(1.5));
    }
}
