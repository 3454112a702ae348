//! Log event to ECS document mapping.
//!
//! Every document starts as a copy of the handler's template (operator extra
//! fields plus [`StaticMetadata`]), gets the environment-sourced fields
//! merged in, and then the event's own attributes written at their ECS
//! paths. Mapping never fails.

pub mod env_fields;
pub mod metadata;

pub use env_fields::{EnvLookup, process_env, resolve_env_fields};
pub use metadata::{AGENT_TYPE, ECS_VERSION, StaticMetadata};

use crate::app::config::{EnvField, HandlerConfig};
use crate::domain::field::{child_map, format_timestamp, merge_fields, nested_map};
use crate::domain::{Document, ErrorInfo, FieldMap, FieldValue, LogEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Extra keys that are bookkeeping of some logging front-end and never
/// make it into a document.
pub const FILTERED_FIELDS: &[&str] = &[
    "msecs",
    "relativeCreated",
    "levelno",
    "exc_text",
    "msg",
    "log.target",
    "log.module_path",
    "log.file",
    "log.line",
];

/// Top-level keys owned by the fixed schema or the event itself. Extras
/// cannot replace them once set.
pub const RESERVED_FIELDS: &[&str] = &[
    "@timestamp",
    "message",
    "log",
    "error",
    "ecs",
    "agent",
    "host",
    "args",
];

#[derive(Clone)]
pub struct DocumentMapper {
    template: Arc<FieldMap>,
    env_fields: BTreeMap<String, EnvField>,
    env_lookup: EnvLookup,
}

impl DocumentMapper {
    pub fn new(extra_fields: FieldMap, metadata: &StaticMetadata) -> Self {
        let mut template = extra_fields;
        metadata.apply(&mut template);
        Self {
            template: Arc::new(template),
            env_fields: BTreeMap::new(),
            env_lookup: process_env(),
        }
    }

    pub fn from_config(config: &HandlerConfig, metadata: &StaticMetadata) -> Self {
        let extra_fields = config
            .extra_fields
            .iter()
            .map(|(key, value)| (key.clone(), FieldValue::from(value.clone())))
            .collect();
        Self::new(extra_fields, metadata).with_env_fields(config.extra_fields_from_env.clone())
    }

    pub fn with_env_fields(mut self, env_fields: BTreeMap<String, EnvField>) -> Self {
        self.env_fields = env_fields;
        self
    }

    pub fn with_env_lookup(mut self, lookup: EnvLookup) -> Self {
        self.env_lookup = lookup;
        self
    }

    /// Template every document starts from.
    pub fn template(&self) -> &FieldMap {
        &self.template
    }

    pub fn map(&self, event: LogEvent) -> Document {
        let mut doc = FieldMap::clone(&self.template);

        if !self.env_fields.is_empty() {
            merge_fields(&mut doc, resolve_env_fields(&self.env_fields, &*self.env_lookup));
        }

        let LogEvent {
            timestamp,
            level,
            logger,
            message,
            origin,
            process,
            thread,
            error,
            args,
            extras,
        } = event;

        if let Some(ts) = timestamp {
            doc.insert("@timestamp".to_string(), format_timestamp(&ts).into());
        }

        if let Some(message) = message {
            child_map(&mut doc, "log").insert("original".to_string(), message.clone().into());
            doc.insert("message".to_string(), message.into());
        }

        if let Some(level) = level {
            child_map(&mut doc, "log").insert("level".to_string(), level.as_str().into());
        }

        if let Some(logger) = logger {
            child_map(&mut doc, "log").insert("logger".to_string(), logger.into());
        }

        let file_entries = [
            ("line", origin.line.map(FieldValue::from)),
            ("name", origin.file_name.map(FieldValue::from)),
            ("path", origin.file_path.map(FieldValue::from)),
        ];
        for (key, value) in file_entries {
            if let Some(value) = value {
                nested_map(&mut doc, &["log", "origin", "file"]).insert(key.to_string(), value);
            }
        }
        if let Some(function) = origin.function {
            nested_map(&mut doc, &["log", "origin"])
                .insert("function".to_string(), function.into());
        }
        if let Some(module) = origin.module {
            nested_map(&mut doc, &["log", "origin"]).insert("module".to_string(), module.into());
        }

        if let Some(process) = process {
            let block = nested_map(&mut doc, &["log", "process"]);
            if let Some(name) = process.name {
                block.insert("name".to_string(), name.into());
            }
            block.insert("pid".to_string(), process.pid.into());
        }

        if let Some(thread) = thread {
            let block = nested_map(&mut doc, &["log", "thread"]);
            if let Some(name) = thread.name {
                block.insert("name".to_string(), name.into());
            }
            block.insert("id".to_string(), thread.id.into());
        }

        if let Some(error) = error {
            doc.insert("error".to_string(), FieldValue::Map(error_block(error)));
        }

        if let Some(args) = args {
            let rendered = args
                .iter()
                .map(|arg| FieldValue::Str(arg.to_string()))
                .collect();
            doc.insert("args".to_string(), FieldValue::List(rendered));
        }

        for (key, value) in extras {
            if FILTERED_FIELDS.contains(&key.as_str()) {
                continue;
            }
            if RESERVED_FIELDS.contains(&key.as_str()) && doc.contains_key(&key) {
                continue;
            }
            let value = if value.is_null() {
                FieldValue::Str(String::new())
            } else {
                value
            };
            doc.insert(key, value);
        }

        Document::from_fields(doc)
    }
}

fn error_block(error: ErrorInfo) -> FieldMap {
    let ErrorInfo {
        type_name,
        message,
        stack_trace,
    } = error;

    let mut block = FieldMap::new();
    block.insert("code".to_string(), type_name.clone().into());
    block.insert("id".to_string(), Uuid::new_v4().into());
    block.insert("type".to_string(), type_name.into());
    block.insert("message".to_string(), message.into());
    block.insert("stack_trace".to_string(), stack_trace.into());
    block
}
