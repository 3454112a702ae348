#![allow(dead_code)]

use ecs_log_shipper::sender::{BulkOperation, BulkSink, BulkSummary, SinkError};
use ecs_log_shipper::{HandlerConfig, StaticMetadata};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Sink that keeps every batch it is handed.
#[derive(Default)]
pub struct RecordingSink {
    batches: Mutex<Vec<Vec<BulkOperation>>>,
    fail: AtomicBool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with a connection error (batches are still recorded).
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::SeqCst);
        sink
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<BulkOperation>> {
        self.batches.lock().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().iter().map(Vec::len).collect()
    }

    pub fn call_count(&self) -> usize {
        self.batches.lock().len()
    }

    pub fn messages(&self) -> Vec<String> {
        self.batches
            .lock()
            .iter()
            .flatten()
            .filter_map(|op| op.document.get_str("message").map(str::to_string))
            .collect()
    }
}

impl BulkSink for RecordingSink {
    fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkSummary, SinkError> {
        self.batches.lock().push(operations.to_vec());
        if self.fail.load(Ordering::SeqCst) {
            return Err(SinkError::ConnectionFailed("sink offline".to_string()));
        }
        Ok(BulkSummary::success(operations.len()))
    }

    fn ping(&self) -> bool {
        !self.fail.load(Ordering::SeqCst)
    }
}

/// Config that never flushes on the timer during a test.
pub fn config(index_name: &str, buffer_size: usize) -> HandlerConfig {
    HandlerConfig {
        index_name: index_name.to_string(),
        buffer_size,
        flush_frequency_secs: 3600.0,
        ..HandlerConfig::default()
    }
}

pub fn metadata() -> StaticMetadata {
    StaticMetadata::with_host("test-host", "10.0.0.7")
}

/// Polls `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}
