use super::FlushPolicy;
use super::stats::{FlushStats, FlushStatsSnapshot};
use super::timer::{self, FlushTimer};
use crate::domain::{Document, HandlerError};
use crate::index::IndexNameResolver;
use crate::sender::{BulkOperation, BulkSink, BulkSummary, SinkError};
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// What a flush did with the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was buffered.
    Empty,
    Sent(BulkSummary),
    /// The batch failed and was discarded (non-strict mode only).
    Dropped { documents: usize, reason: String },
}

pub(super) struct BufferState {
    pub(super) buffer: Vec<Document>,
    pub(super) timer: Option<FlushTimer>,
    pub(super) shutdown: bool,
}

pub(super) struct Shared<S> {
    pub(super) state: Mutex<BufferState>,
    pub(super) timer_wakeup: Condvar,
    /// Serializes sink calls; never taken while `state` is held.
    in_flight: Mutex<()>,
    sink: S,
    resolver: IndexNameResolver,
    policy: FlushPolicy,
    stats: FlushStats,
}

impl<S: BulkSink> Shared<S> {
    pub(super) fn flush_on_timer(&self) -> Result<FlushOutcome, HandlerError> {
        let outcome = self.flush()?;
        if !matches!(outcome, FlushOutcome::Empty) {
            self.stats.record_timer_flush();
        }
        Ok(outcome)
    }

    fn flush(&self) -> Result<FlushOutcome, HandlerError> {
        let _in_flight = self.in_flight.lock();

        let batch = {
            let mut state = self.state.lock();
            state.timer = None;
            std::mem::take(&mut state.buffer)
        };

        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        let index = self.resolver.resolve_now();
        let mode = self.resolver.write_mode();
        let operations: Vec<BulkOperation> = batch
            .into_iter()
            .map(|document| BulkOperation::new(index.clone(), mode, document))
            .collect();
        let documents = operations.len();

        self.stats.record_flush();
        let result = self.sink.bulk(&operations).and_then(BulkSummary::into_result);

        match result {
            Ok(summary) => {
                self.stats.record_sent(summary.succeeded());
                tracing::debug!(index = %index, documents, "Flushed batch");
                Ok(FlushOutcome::Sent(summary))
            }
            Err(error) => {
                if let SinkError::Rejected { failed, total, .. } = &error {
                    self.stats.record_sent(total.saturating_sub(*failed));
                    self.stats.record_rejected(*failed);
                }
                self.stats.record_dropped_batch();

                if self.policy.raise_on_error {
                    return Err(HandlerError::Indexing(error));
                }

                tracing::debug!(
                    index = %index,
                    documents,
                    error = %error,
                    "Dropping batch after indexing failure"
                );
                Ok(FlushOutcome::Dropped {
                    documents,
                    reason: error.to_string(),
                })
            }
        }
    }
}

/// Buffers documents and ships them in batches.
///
/// A batch goes out when the buffer reaches `buffer_size` (on the appending
/// thread) or when `flush_interval` has passed since the first document of
/// the batch was appended (on the timer thread).
pub struct FlushScheduler<S: BulkSink + 'static> {
    shared: Arc<Shared<S>>,
    timer_thread: Mutex<Option<JoinHandle<()>>>,
}

impl<S: BulkSink + 'static> FlushScheduler<S> {
    pub fn new(
        sink: S,
        resolver: IndexNameResolver,
        policy: FlushPolicy,
    ) -> Result<Self, HandlerError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(BufferState {
                buffer: Vec::with_capacity(policy.buffer_size.min(4096)),
                timer: None,
                shutdown: false,
            }),
            timer_wakeup: Condvar::new(),
            in_flight: Mutex::new(()),
            sink,
            resolver,
            policy,
            stats: FlushStats::default(),
        });

        let timer_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("ecs-log-flush-timer".to_string())
            .spawn(move || timer::run(timer_shared))
            .map_err(HandlerError::TimerSpawn)?;

        Ok(Self {
            shared,
            timer_thread: Mutex::new(Some(handle)),
        })
    }

    /// Buffers a document. Flushes on this thread once the buffer is full,
    /// otherwise makes sure a timer is armed.
    pub fn append(&self, document: Document) -> Result<(), HandlerError> {
        let full = {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return Err(HandlerError::Closed);
            }

            state.buffer.push(document);
            if state.buffer.len() >= self.shared.policy.buffer_size {
                true
            } else {
                if state.timer.is_none() {
                    state.timer = Some(FlushTimer::arm(self.shared.policy.flush_interval));
                    self.shared.timer_wakeup.notify_one();
                }
                false
            }
        };

        if full {
            self.shared.flush()?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<FlushOutcome, HandlerError> {
        self.shared.flush()
    }

    /// Final flush, then stops the timer thread. Safe to call repeatedly.
    pub fn close(&self) -> Result<(), HandlerError> {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            state.timer = None;
        }
        self.shared.timer_wakeup.notify_all();

        let result = self.shared.flush();
        self.stop_timer_thread();
        result.map(|_| ())
    }

    fn stop_timer_thread(&self) {
        let Some(handle) = self.timer_thread.lock().take() else {
            return;
        };

        // Closing from inside a timed flush: the loop exits on its own.
        if handle.thread().id() == thread::current().id() {
            return;
        }

        if handle.join().is_err() {
            tracing::error!("Flush timer thread panicked");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().shutdown
    }

    pub fn buffered_len(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn timer_armed(&self) -> bool {
        self.shared.state.lock().timer.is_some()
    }

    pub fn stats(&self) -> FlushStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn sink(&self) -> &S {
        &self.shared.sink
    }

    pub fn resolver(&self) -> &IndexNameResolver {
        &self.shared.resolver
    }

    pub fn policy(&self) -> &FlushPolicy {
        &self.shared.policy
    }
}

impl<S: BulkSink + 'static> Drop for FlushScheduler<S> {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Final flush on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldMap;
    use crate::index::{DEFAULT_DATE_FORMAT, Rotation};
    use crate::sender::{MockBulkSink, WriteMode};
    use std::time::Duration;

    fn resolver() -> IndexNameResolver {
        IndexNameResolver::new("logs", Rotation::Never, DEFAULT_DATE_FORMAT, "-").unwrap()
    }

    fn policy(buffer_size: usize, raise_on_error: bool) -> FlushPolicy {
        FlushPolicy {
            buffer_size,
            flush_interval: Duration::from_secs(3600),
            raise_on_error,
        }
    }

    fn doc(n: usize) -> Document {
        let mut fields = FieldMap::new();
        fields.insert("n".to_string(), n.into());
        Document::from_fields(fields)
    }

    #[test]
    fn test_full_buffer_flushes_on_caller() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk()
            .withf(|ops: &[BulkOperation]| {
                ops.len() == 3
                    && ops
                        .iter()
                        .all(|op| op.index == "logs" && op.mode == WriteMode::Index)
            })
            .times(1)
            .returning(|ops| Ok(BulkSummary::success(ops.len())));

        let scheduler = FlushScheduler::new(sink, resolver(), policy(3, false)).unwrap();
        for n in 0..3 {
            scheduler.append(doc(n)).unwrap();
        }

        assert_eq!(scheduler.buffered_len(), 0);
        assert!(!scheduler.timer_armed());
        assert_eq!(scheduler.stats().documents_sent, 3);
        scheduler.close().unwrap();
    }

    #[test]
    fn test_append_arms_single_timer() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk()
            .times(1)
            .returning(|ops| Ok(BulkSummary::success(ops.len())));

        let scheduler = FlushScheduler::new(sink, resolver(), policy(10, false)).unwrap();
        scheduler.append(doc(0)).unwrap();
        assert!(scheduler.timer_armed());
        scheduler.append(doc(1)).unwrap();
        assert!(scheduler.timer_armed());

        scheduler.flush().unwrap();
        assert!(!scheduler.timer_armed());
        scheduler.close().unwrap();
    }

    #[test]
    fn test_empty_flush_skips_sink() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk().never();

        let scheduler = FlushScheduler::new(sink, resolver(), policy(10, true)).unwrap();
        assert_eq!(scheduler.flush().unwrap(), FlushOutcome::Empty);
        scheduler.close().unwrap();
    }

    #[test]
    fn test_failure_swallowed_by_default() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk()
            .times(1)
            .returning(|_| Err(SinkError::ConnectionFailed("refused".to_string())));

        let scheduler = FlushScheduler::new(sink, resolver(), policy(10, false)).unwrap();
        scheduler.append(doc(0)).unwrap();

        match scheduler.flush().unwrap() {
            FlushOutcome::Dropped { documents, .. } => assert_eq!(documents, 1),
            other => panic!("expected dropped batch, got {other:?}"),
        }
        assert_eq!(scheduler.buffered_len(), 0);
        assert_eq!(scheduler.stats().batches_dropped, 1);
        scheduler.close().unwrap();
    }

    #[test]
    fn test_partial_rejection_raised_in_strict_mode() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk().times(1).returning(|ops| {
            Ok(BulkSummary {
                total: ops.len(),
                failed: 1,
                reasons: vec!["mapper_parsing_exception".to_string()],
            })
        });

        let scheduler = FlushScheduler::new(sink, resolver(), policy(10, true)).unwrap();
        scheduler.append(doc(0)).unwrap();
        scheduler.append(doc(1)).unwrap();

        let err = scheduler.flush().unwrap_err();
        assert!(matches!(
            err,
            HandlerError::Indexing(SinkError::Rejected { failed: 1, total: 2, .. })
        ));
        let stats = scheduler.stats();
        assert_eq!(stats.documents_sent, 1);
        assert_eq!(stats.documents_rejected, 1);
        assert_eq!(scheduler.buffered_len(), 0);
        scheduler.close().unwrap();
    }

    #[test]
    fn test_close_is_idempotent_and_rejects_appends() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk()
            .times(1)
            .returning(|ops| Ok(BulkSummary::success(ops.len())));

        let scheduler = FlushScheduler::new(sink, resolver(), policy(10, false)).unwrap();
        scheduler.append(doc(0)).unwrap();

        scheduler.close().unwrap();
        scheduler.close().unwrap();

        assert!(scheduler.is_closed());
        assert!(matches!(scheduler.append(doc(1)), Err(HandlerError::Closed)));
    }

    #[test]
    fn test_timer_flushes_after_interval() {
        let mut sink = MockBulkSink::new();
        sink.expect_bulk()
            .times(1)
            .returning(|ops| Ok(BulkSummary::success(ops.len())));

        let fast = FlushPolicy {
            flush_interval: Duration::from_millis(50),
            ..policy(100, false)
        };
        let scheduler = FlushScheduler::new(sink, resolver(), fast).unwrap();
        scheduler.append(doc(0)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while scheduler.stats().timer_flushes == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(scheduler.stats().timer_flushes, 1);
        assert_eq!(scheduler.buffered_len(), 0);
        assert!(!scheduler.timer_armed());
        scheduler.close().unwrap();
    }

    struct PanicsOnce {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl BulkSink for PanicsOnce {
        fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary, SinkError> {
            if self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                panic!("sink exploded");
            }
            Ok(BulkSummary::success(operations.len()))
        }

        fn ping(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_timer_survives_panicking_sink() {
        let sink = PanicsOnce {
            calls: std::sync::atomic::AtomicUsize::new(0),
        };
        let fast = FlushPolicy {
            flush_interval: Duration::from_millis(20),
            ..policy(100, false)
        };
        let scheduler = FlushScheduler::new(sink, resolver(), fast).unwrap();
        scheduler.append(doc(0)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while scheduler.sink().calls.load(std::sync::atomic::Ordering::SeqCst) == 0
            && std::time::Instant::now() < deadline
        {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(scheduler.buffered_len(), 0);

        // The timer thread is still alive and serves the next batch.
        scheduler.append(doc(1)).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while scheduler.stats().timer_flushes == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(scheduler.stats().timer_flushes, 1);
        assert_eq!(scheduler.stats().documents_sent, 1);
        assert!(!scheduler.timer_armed());
        scheduler.close().unwrap();
    }
}
