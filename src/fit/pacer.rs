//! Cooperative scheduling: cancellation, rate-limited yields and the log sink.
//!
//! A fit is a long synchronous computation driven by [`crate::fit::FitSession::advance`].
//! The Newton search calls [`Pacer::checkpoint`] on every step; that is where
//! cancellation is observed and where a yield is scheduled once more than
//! `yield_interval` has passed since the last one. The assembly loop then
//! suspends at the next point boundary so the host regains control.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::FitError;

/// Shared cancellation flag. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-session rate limiter for yields plus the cancellation poll.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last_yield: Instant,
    yield_due: bool,
    cancel: CancelToken,
    yields: usize,
}

impl Pacer {
    pub fn new(interval: Duration, cancel: CancelToken) -> Self {
        Self {
            interval,
            last_yield: Instant::now(),
            yield_due: false,
            cancel,
            yields: 0,
        }
    }

    /// Suspension point: fails with `Cancelled` once cancellation is requested.
    pub fn checkpoint(&mut self) -> Result<(), FitError> {
        if self.cancel.is_cancelled() {
            return Err(FitError::Cancelled);
        }
        let now = Instant::now();
        if now.duration_since(self.last_yield) > self.interval {
            self.last_yield = now;
            self.yield_due = true;
        }
        Ok(())
    }

    /// Consume a pending yield request.
    pub fn take_yield(&mut self) -> bool {
        let due = std::mem::take(&mut self.yield_due);
        if due {
            self.yields += 1;
        }
        due
    }

    /// Yields handed back to the host so far.
    pub fn yields(&self) -> usize {
        self.yields
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }
}

/// Append-only, line-oriented text sink for fit progress. Write errors are dropped.
pub struct LogSink(Box<dyn Write + Send>);

impl LogSink {
    pub fn new(writer: impl Write + Send + 'static) -> Self {
        Self(Box::new(writer))
    }

    pub fn discard() -> Self {
        Self::new(std::io::sink())
    }

    pub fn line(&mut self, line: &str) {
        let _ = writeln!(self.0, "{line}");
    }

    pub fn blank(&mut self) {
        let _ = writeln!(self.0);
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::discard()
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LogSink")
    }
}
