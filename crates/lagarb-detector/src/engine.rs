//! Trigger engine: one evaluation cycle per symbol.
//!
//! Gate order is fixed: divergence threshold -> regime -> session ->
//! per-trigger evaluation -> confluence. A cycle that stops at any gate
//! yields no decision.

use crate::config::DetectorConfig;
use crate::metrics::WindowMetrics;
use crate::session::SessionSchedule;
use crate::snapshot::DivergenceSnapshot;
use crate::triggers::{resolve_confluence, Confluence, TriggerHit, TriggerType};
use chrono::{DateTime, Utc};
use lagarb_core::{Direction, PriceSample, Symbol};
use lagarb_feed::PricePair;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Metrics attached to a decision for downstream audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupportingMetrics {
    pub delta: Decimal,
    pub delta_pct: Decimal,
    pub divergence_bps: f64,
    pub short_return_bps: f64,
    pub long_return_bps: f64,
    pub volatility_bps: f64,
    pub velocity_bps: f64,
    pub acceleration_bps: f64,
    pub max_jump_bps: f64,
    pub tick_count: usize,
    pub agreeing_triggers: Vec<TriggerType>,
    pub confluence: bool,
}

/// An actionable edge for one symbol in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeDecision {
    pub trigger_type: TriggerType,
    pub symbol: Symbol,
    pub direction: Direction,
    /// 0-100.
    pub confidence: f64,
    pub computed_at: DateTime<Utc>,
    pub supporting_metrics: SupportingMetrics,
}

/// How a cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
    NoData,
    NoDivergence,
    RegimeTooCalm,
    SessionClosed,
    NoTrigger,
    ConflictingTriggers,
    Decision(EdgeDecision),
}

impl CycleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::NoDivergence => "no_divergence",
            Self::RegimeTooCalm => "regime_too_calm",
            Self::SessionClosed => "session_closed",
            Self::NoTrigger => "no_trigger",
            Self::ConflictingTriggers => "conflicting_triggers",
            Self::Decision(_) => "decision",
        }
    }

    pub fn decision(&self) -> Option<&EdgeDecision> {
        match self {
            Self::Decision(d) => Some(d),
            _ => None,
        }
    }
}

/// Everything one cycle produced.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub symbol: Symbol,
    pub snapshot: Option<DivergenceSnapshot>,
    pub metrics: Option<WindowMetrics>,
    /// Regime check result, computed whenever window metrics exist so the
    /// risk gate sees it even when an earlier gate stopped the cycle.
    pub regime_too_calm: bool,
    pub hits: Vec<TriggerHit>,
    pub outcome: CycleOutcome,
}

pub struct TriggerEngine {
    config: DetectorConfig,
    sessions: SessionSchedule,
}

impl TriggerEngine {
    pub fn new(config: DetectorConfig) -> Self {
        let sessions = SessionSchedule::new(config.sessions.clone());
        Self { config, sessions }
    }

    #[must_use]
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    fn regime_ok(&self, m: &WindowMetrics) -> bool {
        m.volatility_bps >= self.config.min_volatility_bps && m.tick_count >= self.config.min_ticks
    }

    /// Run one cycle. `pair` is `None` when the ingestor has no usable pair.
    pub fn evaluate(
        &self,
        symbol: &Symbol,
        pair: Option<&PricePair>,
        window: &[PriceSample],
        now: DateTime<Utc>,
    ) -> CycleReport {
        let metrics = (!window.is_empty()).then(|| {
            WindowMetrics::compute(
                window,
                self.config.short_window_ticks,
                self.config.long_window_ticks,
            )
        });
        let regime_too_calm = metrics.as_ref().map_or(true, |m| !self.regime_ok(m));

        let mut report = CycleReport {
            symbol: symbol.clone(),
            snapshot: None,
            metrics,
            regime_too_calm,
            hits: Vec::new(),
            outcome: CycleOutcome::NoData,
        };

        let Some(pair) = pair else {
            return report;
        };

        let snapshot = match DivergenceSnapshot::compute(
            symbol.clone(),
            pair.live.price,
            pair.reference.price,
            now,
        ) {
            Ok(s) => s,
            Err(e) => {
                debug!(%symbol, error = %e, "Snapshot unavailable");
                return report;
            }
        };
        let divergence_bps = snapshot.divergence_bps();
        report.snapshot = Some(snapshot.clone());

        if snapshot.direction().is_none()
            || divergence_bps.abs() < self.config.divergence_threshold_bps
        {
            report.outcome = CycleOutcome::NoDivergence;
            return report;
        }

        let Some(metrics) = report.metrics.clone() else {
            report.outcome = CycleOutcome::RegimeTooCalm;
            return report;
        };
        if report.regime_too_calm {
            report.outcome = CycleOutcome::RegimeTooCalm;
            return report;
        }

        if !self.sessions.is_open(now) {
            report.outcome = CycleOutcome::SessionClosed;
            return report;
        }

        report.hits = TriggerType::ALL
            .iter()
            .filter_map(|tt| tt.evaluate(&snapshot, &metrics, &self.config.triggers))
            .collect();

        let (lead, agreeing, confluence) = match resolve_confluence(&report.hits) {
            Confluence::None => {
                report.outcome = CycleOutcome::NoTrigger;
                return report;
            }
            Confluence::Conflicting => {
                debug!(%symbol, hits = report.hits.len(), "Triggers disagree");
                report.outcome = CycleOutcome::ConflictingTriggers;
                return report;
            }
            Confluence::Single(hit) => (hit, vec![hit.trigger_type], false),
            Confluence::Agreed { lead, agreeing } => (lead, agreeing, true),
        };

        let decision = EdgeDecision {
            trigger_type: lead.trigger_type,
            symbol: symbol.clone(),
            direction: lead.direction,
            confidence: lead.confidence,
            computed_at: now,
            supporting_metrics: SupportingMetrics {
                delta: snapshot.delta,
                delta_pct: snapshot.delta_pct,
                divergence_bps,
                short_return_bps: metrics.short_return_bps,
                long_return_bps: metrics.long_return_bps,
                volatility_bps: metrics.volatility_bps,
                velocity_bps: metrics.velocity_bps,
                acceleration_bps: metrics.acceleration_bps,
                max_jump_bps: metrics.max_jump_bps,
                tick_count: metrics.tick_count,
                agreeing_triggers: agreeing,
                confluence,
            },
        };

        debug!(
            %symbol,
            trigger = %decision.trigger_type,
            direction = %decision.direction,
            confidence = decision.confidence,
            confluence,
            "Edge decision"
        );

        report.outcome = CycleOutcome::Decision(decision);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::tests::window_from;
    use crate::session::SessionWindow;
    use chrono::TimeZone;
    use lagarb_core::{Price, PriceSource};

    fn btc() -> Symbol {
        Symbol::new("BTC").unwrap()
    }

    fn pair(live: f64, reference: f64) -> PricePair {
        let now = Utc::now();
        let sample = |source, p: f64| {
            PriceSample::new(
                btc(),
                source,
                Price::new(Decimal::try_from(p).unwrap()),
                now,
            )
        };
        PricePair {
            symbol: btc(),
            live: sample(PriceSource::Live, live),
            reference: sample(PriceSource::Reference, reference),
            reference_age_ms: 0,
        }
    }

    /// Gently oscillating window ending at `last`, volatile enough for the regime check.
    fn active_window(last: f64) -> Vec<PriceSample> {
        let mut prices: Vec<f64> = (0..40)
            .map(|i| if i % 2 == 0 { 10_000.0 } else { 10_001.0 })
            .collect();
        prices.push(last);
        window_from(&prices)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_no_pair_is_no_data() {
        let engine = TriggerEngine::new(DetectorConfig::default());
        let report = engine.evaluate(&btc(), None, &[], noon());
        assert_eq!(report.outcome, CycleOutcome::NoData);
        assert!(report.regime_too_calm);
    }

    #[test]
    fn test_zero_divergence_no_decision() {
        let engine = TriggerEngine::new(DetectorConfig::default());
        let p = pair(10_001.0, 10_001.0);
        let report = engine.evaluate(&btc(), Some(&p), &active_window(10_050.0), noon());
        assert_eq!(report.outcome, CycleOutcome::NoDivergence);
        assert!(report.snapshot.is_some());
    }

    #[test]
    fn test_below_threshold_no_decision() {
        let engine = TriggerEngine::new(DetectorConfig::default());
        let p = pair(10_005.0, 10_000.0); // 5 bps
        let report = engine.evaluate(&btc(), Some(&p), &active_window(10_005.0), noon());
        assert_eq!(report.outcome, CycleOutcome::NoDivergence);
    }

    #[test]
    fn test_calm_regime_blocks() {
        let engine = TriggerEngine::new(DetectorConfig::default());
        let p = pair(10_030.0, 10_000.0);
        let flat = window_from(&[10_030.0; 40]);
        let report = engine.evaluate(&btc(), Some(&p), &flat, noon());
        assert_eq!(report.outcome, CycleOutcome::RegimeTooCalm);
        assert!(report.regime_too_calm);
    }

    #[test]
    fn test_closed_session_blocks() {
        let config = DetectorConfig {
            sessions: vec![SessionWindow {
                start: "13:30".to_string(),
                end: "20:00".to_string(),
            }],
            ..Default::default()
        };
        let engine = TriggerEngine::new(config);
        let p = pair(10_030.0, 10_000.0);
        let report = engine.evaluate(&btc(), Some(&p), &active_window(10_001.0), noon());
        assert_eq!(report.outcome, CycleOutcome::SessionClosed);
        assert!(!report.regime_too_calm);
    }

    #[test]
    fn test_oracle_lag_decision() {
        let engine = TriggerEngine::new(DetectorConfig::default());
        // 20 bps divergence, quiet oscillation: only oracle_lag fires.
        let p = pair(10_020.0, 10_000.0);
        let report = engine.evaluate(&btc(), Some(&p), &active_window(10_000.0), noon());
        let decision = report.outcome.decision().expect("decision");
        assert_eq!(decision.trigger_type, TriggerType::OracleLag);
        assert_eq!(decision.direction, Direction::Up);
        assert!(!decision.supporting_metrics.confluence);
        assert!(decision.confidence >= 65.0 && decision.confidence <= 85.0);
    }

    #[test]
    fn test_confluence_decision_uses_max() {
        let engine = TriggerEngine::new(DetectorConfig::default());
        // Last tick jumps 30 bps up: breakout, cliff and oracle lag (if quiet) agree.
        let p = pair(10_031.0, 10_000.0);
        let report = engine.evaluate(&btc(), Some(&p), &active_window(10_031.0), noon());
        let decision = report.outcome.decision().expect("decision");
        assert!(decision.supporting_metrics.confluence);
        assert_eq!(decision.direction, Direction::Up);
        let max = report
            .hits
            .iter()
            .filter(|h| h.direction == Direction::Up)
            .map(|h| h.confidence)
            .fold(0.0, f64::max);
        assert_eq!(decision.confidence, max);
    }
}
