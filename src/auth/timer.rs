//! Time sources for expiry decisions and device-flow polling.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicI64,
}

impl ManualClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: AtomicI64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as i64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

/// How a timed wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Elapsed,
    Cancelled,
}

/// Interval primitive used between device-flow polls.
#[async_trait]
pub trait PollTimer: Send + Sync + fmt::Debug {
    /// Wait for `period`, returning early with [`Wait::Cancelled`] when
    /// `cancel` fires.
    async fn wait(&self, period: Duration, cancel: &CancellationToken) -> Wait;
}

/// [`PollTimer`] backed by the tokio clock, which honours
/// `tokio::time::pause` in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioTimer;

#[async_trait]
impl PollTimer for TokioTimer {
    async fn wait(&self, period: Duration, cancel: &CancellationToken) -> Wait {
        tokio::select! {
            _ = cancel.cancelled() => Wait::Cancelled,
            _ = tokio::time::sleep(period) => Wait::Elapsed,
        }
    }
}
