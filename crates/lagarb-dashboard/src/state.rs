//! Status state shared between the engine and the HTTP handlers.
//!
//! Handlers only read. The engine pushes the last divergence, verdict and
//! error after each cycle; queue, cache and feed figures are read live.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;

use lagarb_detector::{CycleOutcome, DivergenceSnapshot};
use lagarb_executor::{OrderTemplateCache, TradePriorityQueue};
use lagarb_feed::StreamIngestor;
use lagarb_risk::RiskGateResult;

use crate::types::{DivergenceView, ErrorView, StatusSnapshot};

#[derive(Clone)]
pub struct StatusState {
    ingestor: Arc<StreamIngestor>,
    queue: Arc<TradePriorityQueue>,
    templates: Arc<OrderTemplateCache>,
    divergences: Arc<RwLock<BTreeMap<String, DivergenceView>>>,
    last_risk: Arc<RwLock<Option<RiskGateResult>>>,
    last_error: Arc<RwLock<Option<ErrorView>>>,
    events_dropped: Arc<AtomicU64>,
    kill_switch_failures: Arc<AtomicU64>,
}

impl StatusState {
    pub fn new(
        ingestor: Arc<StreamIngestor>,
        queue: Arc<TradePriorityQueue>,
        templates: Arc<OrderTemplateCache>,
    ) -> Self {
        Self {
            ingestor,
            queue,
            templates,
            divergences: Arc::new(RwLock::new(BTreeMap::new())),
            last_risk: Arc::new(RwLock::new(None)),
            last_error: Arc::new(RwLock::new(None)),
            events_dropped: Arc::new(AtomicU64::new(0)),
            kill_switch_failures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record the snapshot and outcome of one cycle.
    pub fn record_cycle(&self, snapshot: &DivergenceSnapshot, outcome: &CycleOutcome) {
        let view = DivergenceView {
            live_price: snapshot.live_price.inner(),
            reference_price: snapshot.reference_price.inner(),
            delta: snapshot.delta,
            delta_pct: snapshot.delta_pct,
            divergence_bps: snapshot.divergence_bps(),
            last_outcome: outcome.as_str().to_string(),
            computed_at_ms: snapshot.computed_at.timestamp_millis(),
        };
        self.divergences
            .write()
            .insert(snapshot.symbol.to_string(), view);
    }

    pub fn record_risk(&self, result: RiskGateResult) {
        *self.last_risk.write() = Some(result);
    }

    pub fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write() = Some(ErrorView {
            message: message.into(),
            at_ms: Utc::now().timestamp_millis(),
        });
    }

    /// Total event log records dropped so far.
    pub fn set_events_dropped(&self, total: u64) {
        self.events_dropped.store(total, Ordering::Relaxed);
    }

    /// Record a kill-switch poll result. Failures are also kept as the
    /// last error.
    pub fn record_kill_switch_poll(&self, error: Option<&str>) {
        match error {
            Some(message) => {
                let failures = self.kill_switch_failures.fetch_add(1, Ordering::Relaxed) + 1;
                self.record_error(format!("kill switch poll ({failures} consecutive): {message}"));
            }
            None => self.kill_switch_failures.store(0, Ordering::Relaxed),
        }
    }

    #[must_use]
    pub fn trading_allowed(&self) -> Option<bool> {
        self.last_risk.read().as_ref().map(|r| r.trading_allowed)
    }

    pub fn collect_snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            timestamp_ms: Utc::now().timestamp_millis(),
            feed: self.ingestor.feed_status(),
            divergences: self.divergences.read().clone(),
            risk: self.last_risk.read().clone(),
            queue_size: self.queue.len(),
            queue_capacity: self.queue.capacity(),
            template_cache_size: self.templates.len(),
            template_entries: self.templates.entry_count(),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            kill_switch_failures: self.kill_switch_failures.load(Ordering::Relaxed),
            last_error: self.last_error.read().clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use lagarb_core::{Price, Symbol};
    use lagarb_executor::{PriorityScorer, TemplateConfig};
    use lagarb_feed::IngestorConfig;
    use lagarb_risk::{CheckName, RiskCheck};
    use rust_decimal_macros::dec;

    pub(crate) fn state() -> StatusState {
        StatusState::new(
            Arc::new(StreamIngestor::new(IngestorConfig::default())),
            Arc::new(TradePriorityQueue::new(PriorityScorer::default(), 50)),
            Arc::new(OrderTemplateCache::new(TemplateConfig::default())),
        )
    }

    #[test]
    fn test_empty_snapshot() {
        let snap = state().collect_snapshot();
        assert!(snap.divergences.is_empty());
        assert!(snap.risk.is_none());
        assert_eq!(snap.queue_capacity, 50);
        assert_eq!(snap.template_cache_size, 0);
    }

    #[test]
    fn test_records_cycle_and_verdict() {
        let state = state();
        let snapshot = DivergenceSnapshot::compute(
            Symbol::new("btcusdt").unwrap(),
            Price::new(dec!(101)),
            Price::new(dec!(100)),
            Utc::now(),
        )
        .unwrap();
        state.record_cycle(&snapshot, &CycleOutcome::NoTrigger);
        state.record_risk(RiskGateResult::from_checks(
            vec![RiskCheck::fail(CheckName::KillSwitch, "engaged")],
            Utc::now(),
        ));
        state.record_error("reference poll timed out");

        let snap = state.collect_snapshot();
        let view = &snap.divergences["BTCUSDT"];
        assert_eq!(view.delta, dec!(1));
        assert_eq!(view.last_outcome, "no_trigger");
        assert!((view.divergence_bps - 100.0).abs() < 1e-9);
        assert_eq!(state.trading_allowed(), Some(false));
        assert_eq!(
            snap.last_error.map(|e| e.message).as_deref(),
            Some("reference poll timed out")
        );
    }

    #[test]
    fn test_kill_switch_failures_reset_on_success() {
        let state = state();
        state.record_kill_switch_poll(Some("connection refused"));
        state.record_kill_switch_poll(Some("timed out"));
        let snap = state.collect_snapshot();
        assert_eq!(snap.kill_switch_failures, 2);
        assert!(snap.last_error.unwrap().message.contains("timed out"));

        state.record_kill_switch_poll(None);
        assert_eq!(state.collect_snapshot().kill_switch_failures, 0);
    }
}
