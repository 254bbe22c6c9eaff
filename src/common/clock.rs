//! Injectable time source
//!
//! All liveness and election-timeout math goes through [`Clock`] so tests can
//! drive timeouts deterministically instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use once_cell::sync::Lazy;

/// Monotonic millisecond source.
pub trait Clock: Send + Sync + 'static {
    fn now_ms(&self) -> u64;
}

/// Production clock backed by `Instant`, anchored at process start.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

static START: Lazy<Instant> = Lazy::new(Instant::now);

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        START.elapsed().as_millis() as u64
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
