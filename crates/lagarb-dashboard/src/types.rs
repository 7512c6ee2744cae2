//! Status endpoint response types.

use lagarb_feed::FeedStatus;
use lagarb_risk::RiskGateResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Last divergence observed for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DivergenceView {
    pub live_price: Decimal,
    pub reference_price: Decimal,
    pub delta: Decimal,
    pub delta_pct: Decimal,
    pub divergence_bps: f64,
    /// How the last cycle for this symbol ended.
    pub last_outcome: String,
    pub computed_at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorView {
    pub message: String,
    pub at_ms: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub timestamp_ms: i64,
    pub feed: FeedStatus,
    pub divergences: BTreeMap<String, DivergenceView>,
    /// Most recent verdict, including failing check names.
    pub risk: Option<RiskGateResult>,
    pub queue_size: usize,
    pub queue_capacity: usize,
    pub template_cache_size: usize,
    pub template_entries: usize,
    /// Event log records dropped since start.
    pub events_dropped: u64,
    /// Consecutive failed kill-switch polls; 0 when the source is healthy.
    pub kill_switch_failures: u64,
    pub last_error: Option<ErrorView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// `None` until the first verdict.
    pub trading_allowed: Option<bool>,
}
