use crate::app::config::HandlerConfig;
use crate::buffer::{FlushOutcome, FlushPolicy, FlushScheduler, FlushStatsSnapshot};
use crate::domain::{HandlerError, LogEvent};
use crate::index::IndexNameResolver;
use crate::mapper::{DocumentMapper, EnvLookup, StaticMetadata};
use crate::sender::{BulkSink, ElasticsearchSink};

/// Ships log events to a search datastore as ECS documents.
///
/// `emit` maps the event and buffers the document; batches leave on a full
/// buffer or after the configured flush interval. Dropping the handler
/// closes it, which flushes whatever is still buffered.
pub struct SearchHandler<S: BulkSink + 'static = ElasticsearchSink> {
    mapper: DocumentMapper,
    scheduler: FlushScheduler<S>,
}

impl SearchHandler<ElasticsearchSink> {
    /// Validates `config` and connects lazily to its hosts.
    pub fn new(config: &HandlerConfig) -> Result<Self, HandlerError> {
        config.validate()?;
        let sink = ElasticsearchSink::new(config.connection.clone())?;
        Self::with_sink(config, sink)
    }
}

impl<S: BulkSink + 'static> SearchHandler<S> {
    /// Uses `sink` instead of the HTTP sink; `config.connection` is ignored.
    pub fn with_sink(config: &HandlerConfig, sink: S) -> Result<Self, HandlerError> {
        Self::with_metadata(config, sink, StaticMetadata::detect())
    }

    pub fn with_metadata(
        config: &HandlerConfig,
        sink: S,
        metadata: StaticMetadata,
    ) -> Result<Self, HandlerError> {
        let policy = FlushPolicy::from_config(config)?;
        let resolver = IndexNameResolver::from_config(config)?;
        let mapper = DocumentMapper::from_config(config, &metadata);
        let scheduler = FlushScheduler::new(sink, resolver, policy)?;

        tracing::debug!(
            index = %config.index_name,
            rotation = %config.index_rotate,
            buffer_size = config.buffer_size,
            "Search handler ready"
        );
        Ok(Self { mapper, scheduler })
    }

    /// Replaces the environment lookup used for `extra_fields_from_env`.
    pub fn with_env_lookup(mut self, lookup: EnvLookup) -> Self {
        self.mapper = self.mapper.with_env_lookup(lookup);
        self
    }

    /// Maps and buffers one event. Errors only when the handler is closed,
    /// or in strict mode when this event filled the buffer and the flush
    /// failed.
    pub fn emit(&self, event: LogEvent) -> Result<(), HandlerError> {
        if self.scheduler.is_closed() {
            return Err(HandlerError::Closed);
        }
        let document = self.mapper.map(event);
        self.scheduler.append(document)
    }

    pub fn flush(&self) -> Result<FlushOutcome, HandlerError> {
        self.scheduler.flush()
    }

    pub fn close(&self) -> Result<(), HandlerError> {
        self.scheduler.close()
    }

    /// Whether the datastore answers. Never used on the flush path.
    pub fn ping(&self) -> bool {
        self.scheduler.sink().ping()
    }

    pub fn is_closed(&self) -> bool {
        self.scheduler.is_closed()
    }

    pub fn buffered_len(&self) -> usize {
        self.scheduler.buffered_len()
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.scheduler.stats()
    }

    /// Index a flush would target right now.
    pub fn current_index(&self) -> String {
        self.scheduler.resolver().resolve_now()
    }

    pub fn mapper(&self) -> &DocumentMapper {
        &self.mapper
    }

    pub fn sink(&self) -> &S {
        self.scheduler.sink()
    }
}
