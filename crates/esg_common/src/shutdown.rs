//! Cooperative shutdown signal shared by the signal handler and the pipelines.
//!
//! # Usage
//! ```ignore
//! let signal = ShutdownSignal::new();
//! let worker = signal.clone();
//!
//! // In the pipeline loop:
//! while !worker.is_shutdown() {
//!     // process one page ...
//!     if worker.wait_timeout(Duration::from_secs(1)).await {
//!         break;
//!     }
//! }
//!
//! // From the signal handler:
//! signal.shutdown(); // wakes the sleeping loop immediately
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// A cloneable stop flag whose waiters are woken as soon as `shutdown()` runs.
#[derive(Clone)]
pub struct ShutdownSignal {
    inner: Arc<ShutdownInner>,
}

struct ShutdownInner {
    flag: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    /// Create a new signal in the non-shutdown state.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                flag: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Signal shutdown. Wakes all waiters immediately.
    pub fn shutdown(&self) {
        self.inner.flag.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Check if shutdown has been requested (non-blocking).
    pub fn is_shutdown(&self) -> bool {
        self.inner.flag.load(Ordering::SeqCst)
    }

    /// Resolve once shutdown has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_shutdown() {
                return;
            }
            notified.await;
        }
    }

    /// Sleep for at most `duration`, but wake immediately if `shutdown()` is
    /// called. Returns `true` if shutdown was requested (caller should exit).
    pub async fn wait_timeout(&self, duration: Duration) -> bool {
        if self.is_shutdown() {
            return true;
        }
        let _ = tokio::time::timeout(duration, self.wait()).await;
        self.is_shutdown()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}
