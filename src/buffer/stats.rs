use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct FlushStats {
    flushes: AtomicU64,
    timer_flushes: AtomicU64,
    documents_sent: AtomicU64,
    documents_rejected: AtomicU64,
    batches_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushStatsSnapshot {
    /// Flushes that handed a non-empty batch to the sink.
    pub flushes: u64,
    /// Of those, the ones fired by the timer.
    pub timer_flushes: u64,
    pub documents_sent: u64,
    pub documents_rejected: u64,
    /// Batches lost to a transport error or item rejections.
    pub batches_dropped: u64,
}

impl FlushStats {
    pub fn record_flush(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timer_flush(&self) {
        self.timer_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self, documents: usize) {
        self.documents_sent.fetch_add(documents as u64, Ordering::Relaxed);
    }

    pub fn record_rejected(&self, documents: usize) {
        self.documents_rejected
            .fetch_add(documents as u64, Ordering::Relaxed);
    }

    pub fn record_dropped_batch(&self) {
        self.batches_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> FlushStatsSnapshot {
        FlushStatsSnapshot {
            flushes: self.flushes.load(Ordering::Relaxed),
            timer_flushes: self.timer_flushes.load(Ordering::Relaxed),
            documents_sent: self.documents_sent.load(Ordering::Relaxed),
            documents_rejected: self.documents_rejected.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
        }
    }
}
