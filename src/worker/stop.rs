use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    stop: AtomicBool,
    emergency: AtomicBool,
    notify: Notify,
}

/// Cooperative cancellation shared between a worker and its handle.
///
/// Workers only look at it between iterations (and while waiting for their
/// scheduled start).
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<Inner>);

impl StopFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_stop(&self) {
        self.0.stop.store(true, Ordering::Release);
        self.0.notify.notify_waiters();
    }

    /// Stops without running per-worker teardown hooks.
    pub fn request_emergency_stop(&self) {
        self.0.emergency.store(true, Ordering::Release);
        self.request_stop();
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.stop.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_emergency(&self) -> bool {
        self.0.emergency.load(Ordering::Acquire)
    }

    /// Resolves once a stop has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}
