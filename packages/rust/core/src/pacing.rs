//! Fixed-interval pacing for calls to rate-limited collaborators.
//!
//! A [`Pacer`] guarantees that consecutive call *starts* are at least `delay`
//! apart, whether the previous call succeeded or failed. Time comes from an
//! injectable [`Clock`] so pacing is testable without real sleeps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

/// Source of time for pacing and retry backoff.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// Real clock backed by `tokio::time`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Spaces call starts by a fixed minimum interval.
pub struct Pacer {
    clock: Arc<dyn Clock>,
    delay: Duration,
    last_start: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(clock: Arc<dyn Clock>, delay: Duration) -> Self {
        Self {
            clock,
            delay,
            last_start: Mutex::new(None),
        }
    }

    /// Wait until the next call may start, then mark it started.
    ///
    /// The first call never waits. Concurrent callers are admitted one at a
    /// time, each `delay` after the previous one.
    pub async fn wait(&self) {
        let mut last_start = self.last_start.lock().await;

        if let Some(previous) = *last_start {
            let ready_at = previous + self.delay;
            let now = self.clock.now();
            if ready_at > now {
                let pause = ready_at - now;
                trace!(pause_ms = pause.as_millis() as u64, "pacing");
                self.clock.sleep(pause).await;
            }
        }

        *last_start = Some(self.clock.now());
    }
}
