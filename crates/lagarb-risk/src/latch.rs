//! Trigger-once flag latches for external kill conditions.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::{error, info, warn};

/// Once triggered, stays triggered until manually reset. The first reason wins.
///
/// Thread-safe: share via `Arc<FlagLatch>`.
pub struct FlagLatch {
    name: &'static str,
    triggered: AtomicBool,
    /// Unix ms, 0 when not triggered.
    triggered_at: AtomicI64,
    reason: RwLock<Option<String>>,
}

impl FlagLatch {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            triggered: AtomicBool::new(false),
            triggered_at: AtomicI64::new(0),
            reason: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Trigger with a reason. Returns false if already triggered.
    pub fn trigger(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        if self
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.triggered_at
                .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
            *self.reason.write() = Some(reason.clone());
            error!(latch = self.name, %reason, "Latch triggered");
            true
        } else {
            warn!(latch = self.name, new_reason = %reason, "Latch already triggered, ignoring");
            false
        }
    }

    #[must_use]
    pub fn reason(&self) -> Option<String> {
        if self.is_triggered() {
            self.reason.read().clone()
        } else {
            None
        }
    }

    #[must_use]
    pub fn triggered_at(&self) -> Option<i64> {
        if !self.is_triggered() {
            return None;
        }
        match self.triggered_at.load(Ordering::SeqCst) {
            0 => None,
            ts => Some(ts),
        }
    }

    /// Manual reset.
    pub fn reset(&self) {
        if self.is_triggered() {
            let previous = self.reason.write().take();
            self.triggered_at.store(0, Ordering::SeqCst);
            self.triggered.store(false, Ordering::SeqCst);
            info!(latch = self.name, previous_reason = ?previous, "Latch reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_reason_wins() {
        let latch = FlagLatch::new("kill_switch");
        assert!(!latch.is_triggered());
        assert!(latch.trigger("operator"));
        assert!(!latch.trigger("second"));
        assert_eq!(latch.reason().as_deref(), Some("operator"));
        assert!(latch.triggered_at().is_some());
    }

    #[test]
    fn test_reset() {
        let latch = FlagLatch::new("kill_switch");
        latch.trigger("x");
        latch.reset();
        assert!(!latch.is_triggered());
        assert!(latch.reason().is_none());
        assert!(latch.triggered_at().is_none());
        assert!(latch.trigger("y"));
        assert_eq!(latch.reason().as_deref(), Some("y"));
    }
}
