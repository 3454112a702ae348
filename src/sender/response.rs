use super::BulkSummary;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Rejection reasons kept per batch.
pub const MAX_REASONS: usize = 5;

/// Body of a `_bulk` reply. Only the fields needed to count rejections are
/// read.
#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub errors: bool,
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub error: Option<Value>,
}

impl BulkItem {
    fn failed(&self) -> bool {
        self.status >= 300 || self.error.is_some()
    }

    fn reason(&self) -> String {
        match &self.error {
            Some(Value::Object(error)) => {
                let kind = error.get("type").and_then(Value::as_str);
                let reason = error.get("reason").and_then(Value::as_str);
                match (kind, reason) {
                    (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
                    (Some(text), None) | (None, Some(text)) => text.to_string(),
                    (None, None) => format!("status {}", self.status),
                }
            }
            Some(Value::String(reason)) => reason.clone(),
            Some(other) => other.to_string(),
            None => format!("status {}", self.status),
        }
    }
}

impl BulkResponse {
    pub fn summarize(&self, total: usize) -> BulkSummary {
        let mut summary = BulkSummary::success(total);

        for item in self.items.iter().flat_map(HashMap::values) {
            if item.failed() {
                summary.failed += 1;
                if summary.reasons.len() < MAX_REASONS {
                    summary.reasons.push(item.reason());
                }
            }
        }

        // errors=true with no parsable item still means something was rejected
        if self.errors && summary.failed == 0 {
            summary.failed = total;
            summary.reasons.push("bulk response reported errors".to_string());
        }

        summary
    }
}
