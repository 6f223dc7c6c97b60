//! Rate-limited scheduler for outbound chain calls
//!
//! One instance is shared by every job and trigger so the external call
//! budget is global:
//! - at most one task in flight
//! - consecutive task *starts* are at least `min_spacing` apart
//! - tasks are admitted in submission order (tokio's `Mutex` is FIFO-fair)
//!
//! No per-task timeout is applied here. A call that never returns holds the
//! scheduler, so the transport below (`RpcChainReader`) carries the timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub struct RateLimitedScheduler {
    min_spacing: Duration,
    /// Start time of the most recently admitted task; held for the task's duration
    last_start: Mutex<Option<Instant>>,
}

impl RateLimitedScheduler {
    pub fn new(min_spacing: Duration) -> Self {
        Self {
            min_spacing,
            last_start: Mutex::new(None),
        }
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Submit and await: wait for a slot, run `task`, return its output
    ///
    /// The task's own error is returned to the caller untouched; it never
    /// delays or cancels later submissions beyond the usual spacing.
    pub async fn schedule<F, Fut, T>(&self, task: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            sleep_until(previous + self.min_spacing).await;
        }

        *last_start = Some(Instant::now());

        task().await
    }

    /// Submit and continue: queue `task` on a spawned tokio task
    ///
    /// Spacing and the single in-flight slot still apply, but admission order
    /// between separate `submit` calls is not guaranteed.
    pub fn submit<F, Fut, T>(self: &Arc<Self>, task: F) -> JoinHandle<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.schedule(task).await })
    }
}
