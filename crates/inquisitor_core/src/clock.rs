//! Time source shared by the store and the reconciliation engine.
//!
//! # Responsibility
//! - Provide unix-second timestamps for `created` stamping and lifecycle
//!   policy evaluation (`ttl`, `ttd`, `tts`).
//! - Allow callers to pin time explicitly instead of reading a global clock.
//!
//! # Invariants
//! - All timestamps are whole unix seconds.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of "now" in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            // A clock set before 1970 is treated as negative time.
            Err(err) => -(err.duration().as_secs() as i64),
        }
    }
}

/// Manually driven clock for scheduled replays and deterministic checks.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
