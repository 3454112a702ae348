use crate::app::config::EnvField;
use crate::domain::{FieldMap, FieldValue};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Reads one environment variable. Swappable so tests need not touch the
/// process environment.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub fn process_env() -> EnvLookup {
    Arc::new(|name: &str| std::env::var(name).ok())
}

/// Resolves the variable names in `spec` to their current values.
///
/// Unset variables are left out, and so are nested levels that end up
/// empty, so merging the result never clobbers template values.
pub fn resolve_env_fields(
    spec: &BTreeMap<String, EnvField>,
    lookup: &(dyn Fn(&str) -> Option<String> + Send + Sync),
) -> FieldMap {
    let mut resolved = FieldMap::new();
    for (key, field) in spec {
        match field {
            EnvField::Var(name) => {
                if let Some(value) = lookup(name) {
                    resolved.insert(key.clone(), FieldValue::Str(value));
                }
            }
            EnvField::Nested(inner) => {
                let nested = resolve_env_fields(inner, lookup);
                if !nested.is_empty() {
                    resolved.insert(key.clone(), FieldValue::Map(nested));
                }
            }
        }
    }
    resolved
}
