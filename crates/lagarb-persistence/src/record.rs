//! Flat event row.
//!
//! Every row carries the same columns; those that do not apply to the event
//! type are null. The full event is kept in `payload`.

use chrono::{DateTime, Utc};
use lagarb_core::Direction;
use lagarb_detector::{DivergenceSnapshot, EdgeDecision};
use lagarb_risk::RiskGateResult;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    DivergenceSnapshot,
    EdgeDecision,
    RiskGateResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp_ms: i64,
    pub event_type: EventType,
    pub symbol: Option<String>,
    pub live_price: Option<Decimal>,
    pub reference_price: Option<Decimal>,
    pub delta: Option<Decimal>,
    pub delta_pct: Option<Decimal>,
    pub trigger_type: Option<String>,
    pub direction: Option<Direction>,
    pub confidence: Option<f64>,
    pub confluence: Option<bool>,
    pub trading_allowed: Option<bool>,
    pub hard_block_count: Option<usize>,
    pub soft_warning_count: Option<usize>,
    pub failed_checks: Option<Vec<String>>,
    pub payload: serde_json::Value,
}

impl EventRecord {
    fn empty(event_type: EventType, at: DateTime<Utc>, payload: serde_json::Value) -> Self {
        Self {
            timestamp_ms: at.timestamp_millis(),
            event_type,
            symbol: None,
            live_price: None,
            reference_price: None,
            delta: None,
            delta_pct: None,
            trigger_type: None,
            direction: None,
            confidence: None,
            confluence: None,
            trading_allowed: None,
            hard_block_count: None,
            soft_warning_count: None,
            failed_checks: None,
            payload,
        }
    }

    pub fn from_snapshot(snapshot: &DivergenceSnapshot) -> Self {
        Self {
            symbol: Some(snapshot.symbol.to_string()),
            live_price: Some(snapshot.live_price.inner()),
            reference_price: Some(snapshot.reference_price.inner()),
            delta: Some(snapshot.delta),
            delta_pct: Some(snapshot.delta_pct),
            direction: snapshot.direction(),
            ..Self::empty(
                EventType::DivergenceSnapshot,
                snapshot.computed_at,
                to_payload(snapshot),
            )
        }
    }

    pub fn from_decision(decision: &EdgeDecision) -> Self {
        let m = &decision.supporting_metrics;
        Self {
            symbol: Some(decision.symbol.to_string()),
            delta: Some(m.delta),
            delta_pct: Some(m.delta_pct),
            trigger_type: Some(decision.trigger_type.as_str().to_string()),
            direction: Some(decision.direction),
            confidence: Some(decision.confidence),
            confluence: Some(m.confluence),
            ..Self::empty(
                EventType::EdgeDecision,
                decision.computed_at,
                to_payload(decision),
            )
        }
    }

    /// `symbol` is the symbol whose cycle produced the verdict, if any.
    pub fn from_risk_result(result: &RiskGateResult, symbol: Option<&str>) -> Self {
        Self {
            symbol: symbol.map(str::to_string),
            trading_allowed: Some(result.trading_allowed),
            hard_block_count: Some(result.hard_block_count),
            soft_warning_count: Some(result.soft_warning_count),
            failed_checks: Some(
                result
                    .failed_checks()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            ),
            ..Self::empty(EventType::RiskGateResult, result.timestamp, to_payload(result))
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
}
