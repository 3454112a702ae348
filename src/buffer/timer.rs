use super::scheduler::Shared;
use crate::sender::BulkSink;
use parking_lot::MutexGuard;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A pending time-triggered flush. At most one exists per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushTimer {
    pub armed_at: Instant,
    /// `None` when the interval reaches past what `Instant` can represent;
    /// such a timer never fires.
    pub deadline: Option<Instant>,
}

impl FlushTimer {
    pub fn arm(interval: Duration) -> Self {
        let armed_at = Instant::now();
        Self {
            armed_at,
            deadline: armed_at.checked_add(interval),
        }
    }

    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}

/// Body of the timer thread. Sleeps until the armed deadline (or forever
/// when nothing is armed) and flushes like any other caller.
pub(super) fn run<S: BulkSink>(shared: Arc<Shared<S>>) {
    let mut state = shared.state.lock();

    loop {
        if state.shutdown {
            break;
        }

        let Some(timer) = state.timer else {
            shared.timer_wakeup.wait(&mut state);
            continue;
        };

        if !timer.is_due(Instant::now()) {
            match timer.deadline {
                Some(deadline) => {
                    shared.timer_wakeup.wait_until(&mut state, deadline);
                }
                None => shared.timer_wakeup.wait(&mut state),
            }
            continue;
        }

        // Cleared before the sink is involved, whatever happens next.
        state.timer = None;

        MutexGuard::unlocked(&mut state, || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| shared.flush_on_timer()));
            match result {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Timed flush failed");
                }
                Err(_) => {
                    tracing::error!("Timed flush panicked; batch dropped");
                }
            }
        });
    }

    tracing::debug!("Flush timer thread stopped");
}
