//! Buffer fill coordination.
//!
//! Ticks race to prepare the next day's buffer, and the daily reset
//! must not consume a buffer while a fill is still writing it. The
//! latch arbitrates both: `try_begin_fill` elects exactly one filler,
//! and `wait_ready` parks the reset until the fill lands.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// A ready flag with wakeups, owned by the lifecycle.
///
/// The latch starts ready (no fill in flight). A winner of
/// [`try_begin_fill`](Self::try_begin_fill) must call
/// [`complete_fill`](Self::complete_fill) when done, success or not,
/// or the reset would wait forever.
#[derive(Debug)]
pub struct BufferLatch {
    ready: AtomicBool,
    notify: Notify,
}

impl BufferLatch {
    /// Create a latch in the ready state.
    pub fn new() -> Self {
        Self {
            ready: AtomicBool::new(true),
            notify: Notify::new(),
        }
    }

    /// Claim the fill. Returns `true` for exactly one caller; the
    /// others should skip, the winner's fill covers them.
    pub fn try_begin_fill(&self) -> bool {
        self.ready
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Release the latch and wake every waiter.
    pub fn complete_fill(&self) {
        self.ready.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// True when no fill is in flight.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Wait until no fill is in flight. Returns immediately when the
    /// latch is already ready.
    pub async fn wait_ready(&self) {
        loop {
            // The notified future must exist before the flag is
            // re-checked, or a release between check and park would be
            // missed.
            let notified = self.notify.notified();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for BufferLatch {
    fn default() -> Self {
        Self::new()
    }
}
