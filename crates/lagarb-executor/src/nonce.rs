//! Monotonic nonce generation.
//!
//! Nonces track wall-clock milliseconds but never repeat or go backwards,
//! even when the clock does.

use std::sync::atomic::{AtomicU64, Ordering};

/// Time source, injectable for tests.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Issues `max(last + 1, now_ms)` under a CAS loop. Thread-safe.
pub struct NonceManager<C: Clock> {
    counter: AtomicU64,
    clock: C,
}

impl<C: Clock> NonceManager<C> {
    #[must_use]
    pub fn new(clock: C) -> Self {
        Self {
            counter: AtomicU64::new(clock.now_ms().saturating_sub(1)),
            clock,
        }
    }

    pub fn next(&self) -> u64 {
        let target = self.clock.now_ms();

        loop {
            let current = self.counter.load(Ordering::Acquire);
            let next_val = current.saturating_add(1).max(target);

            if self
                .counter
                .compare_exchange_weak(current, next_val, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return next_val;
            }
        }
    }
}
