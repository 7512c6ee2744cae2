//! Prometheus metrics for the lagarb engine.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()`. A registration failure means a
//! duplicate metric name, which is a startup bug. These panics only occur
//! during static initialization, never at runtime.

use crate::error::{TelemetryError, TelemetryResult};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_gauge, register_gauge_vec, register_histogram,
    register_int_counter, register_int_gauge, CounterVec, Encoder, Gauge, GaugeVec, Histogram,
    IntCounter, IntGauge, TextEncoder,
};

/// Live feed connection state (1 = connected).
pub static FEED_CONNECTED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("lagarb_feed_connected", "Live feed connection state (1=connected)").unwrap()
});

/// Live feed reconnections by reason.
pub static FEED_RECONNECT_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_feed_reconnect_total",
        "Live feed reconnection attempts",
        &["reason"]
    )
    .unwrap()
});

/// Live feed messages that failed to parse.
pub static FEED_PARSE_ERRORS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lagarb_feed_parse_errors_total",
        "Live feed messages rejected by the parser"
    )
    .unwrap()
});

/// Reference poll failures by symbol.
pub static REFERENCE_POLL_FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_reference_poll_failures_total",
        "Reference price poll failures",
        &["symbol"]
    )
    .unwrap()
});

/// Quote poll failures.
pub static QUOTE_POLL_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lagarb_quote_poll_failures_total",
        "Prediction-market quote poll failures"
    )
    .unwrap()
});

/// Kill-switch source polls that failed or timed out.
pub static KILL_SWITCH_POLL_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lagarb_kill_switch_poll_failures_total",
        "Kill switch source poll failures"
    )
    .unwrap()
});

/// Event log records dropped while the log could not be written.
pub static EVENTS_DROPPED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lagarb_events_dropped_total",
        "Event log records dropped because the pending buffer was full"
    )
    .unwrap()
});

/// Paper positions settled, by result.
pub static POSITIONS_SETTLED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_positions_settled_total",
        "Paper positions closed against the quote book",
        &["result"]
    )
    .unwrap()
});

/// Last observed divergence between live and reference price.
pub static DIVERGENCE_BPS: Lazy<GaugeVec> = Lazy::new(|| {
    register_gauge_vec!(
        "lagarb_divergence_bps",
        "Live minus reference divergence in basis points",
        &["symbol"]
    )
    .unwrap()
});

/// Edge decisions emitted, by trigger and direction.
pub static DECISIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_decisions_total",
        "Edge decisions emitted by the trigger engine",
        &["trigger", "direction"]
    )
    .unwrap()
});

/// Cycle outcomes that did not produce a decision.
pub static CYCLE_SKIPPED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_cycle_skipped_total",
        "Detection cycles that ended without a decision",
        &["outcome"]
    )
    .unwrap()
});

/// Risk gate failures by check name.
pub static GATE_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_gate_blocked_total",
        "Risk gate check failures",
        &["check", "severity"]
    )
    .unwrap()
});

/// Trading allowed by the latest gate verdict (1 = allowed).
pub static TRADING_ALLOWED: Lazy<Gauge> = Lazy::new(|| {
    register_gauge!("lagarb_trading_allowed", "Latest risk gate verdict (1=allowed)").unwrap()
});

/// Pending trade candidates.
pub static QUEUE_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("lagarb_queue_size", "Pending trade candidates").unwrap()
});

/// Queue admissions by outcome.
pub static QUEUE_ADMISSIONS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "lagarb_queue_admissions_total",
        "Trade candidate enqueue outcomes",
        &["outcome"]
    )
    .unwrap()
});

/// Distinct markets held by the order template cache.
pub static TEMPLATE_CACHE_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "lagarb_template_cache_markets",
        "Distinct markets in the order template cache"
    )
    .unwrap()
});

/// Template fills.
pub static TEMPLATE_FILLS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!("lagarb_template_fills_total", "Order templates filled").unwrap()
});

/// Template evictions.
pub static TEMPLATE_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lagarb_template_evictions_total",
        "Order template entries evicted"
    )
    .unwrap()
});

/// Payloads handed to the execution sink.
pub static ORDERS_DISPATCHED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "lagarb_orders_dispatched_total",
        "Order payloads handed to the execution sink"
    )
    .unwrap()
});

/// Wall time of one detection cycle across all symbols.
pub static CYCLE_LATENCY_MS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "lagarb_cycle_latency_ms",
        "Detection cycle latency in milliseconds",
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0]
    )
    .unwrap()
});

/// Metrics helper for convenient access.
pub struct Metrics;

impl Metrics {
    pub fn feed_connected() {
        FEED_CONNECTED.set(1.0);
    }

    pub fn feed_disconnected() {
        FEED_CONNECTED.set(0.0);
    }

    /// Record a live feed reconnection.
    pub fn feed_reconnect(reason: &str) {
        FEED_RECONNECT_TOTAL.with_label_values(&[reason]).inc();
    }

    pub fn feed_parse_error() {
        FEED_PARSE_ERRORS_TOTAL.inc();
    }

    /// Record a failed reference poll.
    pub fn reference_poll_failed(symbol: &str) {
        REFERENCE_POLL_FAILURES_TOTAL
            .with_label_values(&[symbol])
            .inc();
    }

    pub fn quote_poll_failed() {
        QUOTE_POLL_FAILURES_TOTAL.inc();
    }

    pub fn kill_switch_poll_failed() {
        KILL_SWITCH_POLL_FAILURES_TOTAL.inc();
    }

    pub fn events_dropped(count: u64) {
        EVENTS_DROPPED_TOTAL.inc_by(count);
    }

    /// Record a settled paper position ("win" / "loss" / "flat").
    pub fn position_settled(result: &str) {
        POSITIONS_SETTLED_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn divergence(symbol: &str, bps: f64) {
        DIVERGENCE_BPS.with_label_values(&[symbol]).set(bps);
    }

    /// Record an emitted edge decision.
    pub fn decision(trigger: &str, direction: &str) {
        DECISIONS_TOTAL
            .with_label_values(&[trigger, direction])
            .inc();
    }

    pub fn cycle_skipped(outcome: &str) {
        CYCLE_SKIPPED_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a failed risk check.
    pub fn gate_blocked(check: &str, severity: &str) {
        GATE_BLOCKED_TOTAL
            .with_label_values(&[check, severity])
            .inc();
    }

    pub fn trading_allowed(allowed: bool) {
        TRADING_ALLOWED.set(if allowed { 1.0 } else { 0.0 });
    }

    pub fn queue_size(size: usize) {
        QUEUE_SIZE.set(size as i64);
    }

    /// Record an enqueue outcome (admitted / evicted / rejected).
    pub fn queue_admission(outcome: &str) {
        QUEUE_ADMISSIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    pub fn template_cache_size(markets: usize) {
        TEMPLATE_CACHE_SIZE.set(markets as i64);
    }

    pub fn template_filled() {
        TEMPLATE_FILLS_TOTAL.inc();
    }

    pub fn template_evicted(count: usize) {
        TEMPLATE_EVICTIONS_TOTAL.inc_by(count as u64);
    }

    pub fn order_dispatched() {
        ORDERS_DISPATCHED_TOTAL.inc();
    }

    pub fn cycle_latency(latency_ms: f64) {
        CYCLE_LATENCY_MS.observe(latency_ms);
    }
}

/// Render every registered collector in the prometheus text format.
pub fn gather_text() -> TelemetryResult<String> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder
        .encode(&prometheus::gather(), &mut buffer)
        .map_err(|e| TelemetryError::Encode(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::Encode(e.to_string()))
}
