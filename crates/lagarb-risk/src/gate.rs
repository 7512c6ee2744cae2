//! Risk gate evaluation.
//!
//! Evaluation reads state and never mutates it. The trade log and the
//! override registry live for the process lifetime.

use crate::check::{CheckName, RiskCheck, RiskGateResult};
use crate::config::RiskGateConfig;
use crate::latch::FlagLatch;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, warn};

/// Per-evaluation inputs gathered by the caller.
#[derive(Debug, Clone, Default)]
pub struct RiskInputs {
    /// Age of the last live sample; `None` if never seen.
    pub live_age_ms: Option<i64>,
    /// Age of the last reference value; `None` if never seen.
    pub reference_age_ms: Option<i64>,
    /// Detector's regime flag for the cycle.
    pub regime_too_calm: bool,
}

/// Realized PnL of a closed trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub pnl_usd: Decimal,
    pub closed_at: DateTime<Utc>,
}

/// Forces a check to pass while keeping it in the result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskOverride {
    pub check: CheckName,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

pub struct RiskGate {
    config: RiskGateConfig,
    trades: RwLock<VecDeque<TradeRecord>>,
    overrides: RwLock<BTreeMap<CheckName, RiskOverride>>,
    kill_switch: Arc<FlagLatch>,
    manipulation: Arc<FlagLatch>,
}

impl RiskGate {
    pub fn new(config: RiskGateConfig) -> Self {
        Self {
            config,
            trades: RwLock::new(VecDeque::new()),
            overrides: RwLock::new(BTreeMap::new()),
            kill_switch: Arc::new(FlagLatch::new("kill_switch")),
            manipulation: Arc::new(FlagLatch::new("manipulation_flag")),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RiskGateConfig {
        &self.config
    }

    /// External kill-switch latch.
    #[must_use]
    pub fn kill_switch(&self) -> Arc<FlagLatch> {
        self.kill_switch.clone()
    }

    /// External manipulation latch.
    #[must_use]
    pub fn manipulation_flag(&self) -> Arc<FlagLatch> {
        self.manipulation.clone()
    }

    // Trade log

    /// Append a closed trade and drop entries outside the drawdown window.
    pub fn record_trade(&self, pnl_usd: Decimal, closed_at: DateTime<Utc>) {
        let cutoff = closed_at - Duration::seconds(self.config.drawdown_window_secs);
        let mut trades = self.trades.write();
        trades.push_back(TradeRecord { pnl_usd, closed_at });
        while trades.front().is_some_and(|t| t.closed_at < cutoff) {
            trades.pop_front();
        }
    }

    /// Peak-to-trough decline of cumulative PnL over the window, as a
    /// percentage of bankroll.
    pub fn drawdown_pct_at(&self, now: DateTime<Utc>) -> f64 {
        let cutoff = now - Duration::seconds(self.config.drawdown_window_secs);
        let trades = self.trades.read();

        let mut cumulative = Decimal::ZERO;
        let mut peak = Decimal::ZERO;
        let mut worst = Decimal::ZERO;
        for trade in trades.iter().filter(|t| t.closed_at >= cutoff && t.closed_at <= now) {
            cumulative += trade.pnl_usd;
            peak = peak.max(cumulative);
            worst = worst.max(peak - cumulative);
        }

        (worst / self.config.bankroll_usd * Decimal::from(100))
            .to_f64()
            .unwrap_or(f64::INFINITY)
    }

    // Overrides

    pub fn add_override(&self, check: CheckName, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(check = %check, %reason, "Risk override added");
        self.overrides.write().insert(
            check,
            RiskOverride {
                check,
                reason,
                created_at: Utc::now(),
            },
        );
    }

    /// Returns true if an override was removed.
    pub fn remove_override(&self, check: CheckName) -> bool {
        let removed = self.overrides.write().remove(&check).is_some();
        if removed {
            warn!(check = %check, "Risk override removed");
        }
        removed
    }

    #[must_use]
    pub fn overrides(&self) -> Vec<RiskOverride> {
        self.overrides.read().values().cloned().collect()
    }

    // Evaluation

    pub fn evaluate(&self, inputs: &RiskInputs) -> RiskGateResult {
        self.evaluate_at(inputs, Utc::now())
    }

    /// Run every check in fixed order; none short-circuits.
    pub fn evaluate_at(&self, inputs: &RiskInputs, now: DateTime<Utc>) -> RiskGateResult {
        let checks = vec![
            self.check_stale_feed(inputs),
            Self::check_latch(CheckName::KillSwitch, &self.kill_switch),
            Self::check_latch(CheckName::ManipulationFlag, &self.manipulation),
            self.check_drawdown(now),
            Self::check_regime(inputs),
        ];

        let overrides = self.overrides.read();
        let checks = checks
            .into_iter()
            .map(|mut check| {
                if let Some(ov) = overrides.get(&check.name) {
                    if !check.passed {
                        debug!(check = %check.name, reason = %ov.reason, "Override applied");
                        check.passed = true;
                        check.message = format!("{} (overridden: {})", check.message, ov.reason);
                        check.overridden = Some(ov.reason.clone());
                    }
                }
                check
            })
            .collect();

        RiskGateResult::from_checks(checks, now)
    }

    fn check_stale_feed(&self, inputs: &RiskInputs) -> RiskCheck {
        let limit = self.config.max_feed_staleness_ms;
        let (live, reference) = match (inputs.live_age_ms, inputs.reference_age_ms) {
            (Some(l), Some(r)) => (l, r),
            (live, _) => {
                let missing = if live.is_none() { "live" } else { "reference" };
                return RiskCheck::fail(CheckName::StaleFeed, format!("no {missing} data"))
                    .with_values(None, Some(limit as f64));
            }
        };

        let age = live.max(reference);
        let check = if age > limit {
            let which = if live >= reference { "live" } else { "reference" };
            RiskCheck::fail(
                CheckName::StaleFeed,
                format!("{which} feed {age}ms old > {limit}ms"),
            )
        } else {
            RiskCheck::pass(CheckName::StaleFeed, format!("feeds {age}ms old"))
        };
        check.with_values(Some(age as f64), Some(limit as f64))
    }

    fn check_latch(name: CheckName, latch: &FlagLatch) -> RiskCheck {
        match latch.reason() {
            Some(reason) => RiskCheck::fail(name, reason),
            None if latch.is_triggered() => RiskCheck::fail(name, "triggered"),
            None => RiskCheck::pass(name, "clear"),
        }
    }

    fn check_drawdown(&self, now: DateTime<Utc>) -> RiskCheck {
        let pct = self.drawdown_pct_at(now);
        let limit = self.config.drawdown_halt_pct;
        let check = if pct >= limit {
            RiskCheck::fail(
                CheckName::Drawdown,
                format!("drawdown {pct:.2}% >= {limit:.2}%"),
            )
        } else {
            RiskCheck::pass(CheckName::Drawdown, format!("drawdown {pct:.2}%"))
        };
        check.with_values(Some(pct), Some(limit))
    }

    fn check_regime(inputs: &RiskInputs) -> RiskCheck {
        if inputs.regime_too_calm {
            RiskCheck::fail(CheckName::RegimeTooCalm, "regime too calm")
        } else {
            RiskCheck::pass(CheckName::RegimeTooCalm, "regime active")
        }
    }
}
