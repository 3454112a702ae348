use super::BulkOperation;
use crate::domain::field::{format_timestamp, render_display};
use crate::domain::{Document, FieldValue};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::io::Write;
use thiserror::Error;

// Upper bound for the pre-allocated body buffer
const MAX_SAFE_BUFFER_SIZE: usize = 100 * 1024 * 1024; // 100MB
const ESTIMATED_DOCUMENT_SIZE: usize = 600; // bytes per document
const ACTION_LINE_OVERHEAD: usize = 64; // bytes

#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("IO error during serialization: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Batch is empty")]
    EmptyBatch,
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::Int(v) => serializer.serialize_i64(*v),
            FieldValue::UInt(v) => serializer.serialize_u64(*v),
            FieldValue::Float(v) if v.is_finite() => serializer.serialize_f64(*v),
            // NaN and infinities have no JSON form
            FieldValue::Float(v) => serializer.serialize_str(&render_display(v)),
            FieldValue::Str(v) => serializer.serialize_str(v),
            FieldValue::Timestamp(v) => serializer.serialize_str(&format_timestamp(v)),
            FieldValue::Uuid(v) => serializer.collect_str(&v.hyphenated()),
            FieldValue::Display(v) => serializer.serialize_str(&render_display(v)),
            FieldValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            FieldValue::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let fields = self.fields();
        let mut out = serializer.serialize_map(Some(fields.len()))?;
        for (key, value) in fields {
            out.serialize_entry(key, value)?;
        }
        out.end()
    }
}

/// Converts a field value to JSON. Never fails: anything JSON cannot hold
/// comes out as its string form.
pub fn encode(value: &FieldValue) -> serde_json::Value {
    serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::String(render_display(value)))
}

/// Like [`encode`] for arbitrary values, falling back to `Display` when the
/// value's own `Serialize` impl errors.
pub fn encode_or_display<T>(value: &T) -> serde_json::Value
where
    T: Serialize + fmt::Display + ?Sized,
{
    serde_json::to_value(value)
        .unwrap_or_else(|_| serde_json::Value::String(render_display(&value)))
}

#[derive(Serialize)]
struct ActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "lowercase")]
enum ActionLine<'a> {
    Index(ActionMeta<'a>),
    Create(ActionMeta<'a>),
}

impl<'a> ActionLine<'a> {
    fn for_operation(op: &'a BulkOperation) -> Self {
        let meta = ActionMeta { index: &op.index };
        match op.mode {
            super::WriteMode::Index => ActionLine::Index(meta),
            super::WriteMode::Create => ActionLine::Create(meta),
        }
    }
}

/// Encodes operations as a `_bulk` request body: one action line followed
/// by one source line per document, newline-terminated.
#[derive(Debug, Clone, Default)]
pub struct BulkBodySerializer;

impl BulkBodySerializer {
    pub fn new() -> Self {
        Self
    }

    pub fn serialize_ndjson(
        &self,
        operations: &[BulkOperation],
    ) -> Result<Vec<u8>, SerializationError> {
        if operations.is_empty() {
            return Err(SerializationError::EmptyBatch);
        }

        let capacity = self.estimate_serialized_size(operations).min(MAX_SAFE_BUFFER_SIZE);
        let mut buffer = Vec::with_capacity(capacity);

        for op in operations {
            serde_json::to_writer(&mut buffer, &ActionLine::for_operation(op))?;
            buffer.write_all(b"\n")?;
            serde_json::to_writer(&mut buffer, &op.document)?;
            buffer.write_all(b"\n")?;
        }

        Ok(buffer)
    }

    pub fn serialize_compressed(
        &self,
        operations: &[BulkOperation],
    ) -> Result<Vec<u8>, SerializationError> {
        use flate2::{Compression, write::GzEncoder};

        let data = self.serialize_ndjson(operations)?;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&data)?;
        Ok(encoder.finish()?)
    }

    pub fn estimate_serialized_size(&self, operations: &[BulkOperation]) -> usize {
        operations
            .len()
            .saturating_mul(ESTIMATED_DOCUMENT_SIZE + ACTION_LINE_OVERHEAD)
    }
}
