//! Live trade message parsing.
//!
//! Accepts bare trade frames `{"s": "BTCUSDT", "p": "65000.1", "T": 1700000000000}`
//! and combined-stream frames that wrap the same object in a `"data"` envelope.
//! Frames without trade fields (subscription acks, heartbeats) parse to `None`.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, TimeZone, Utc};
use lagarb_core::{Price, Symbol};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Deserialize)]
struct RawTrade {
    #[serde(rename = "s")]
    stream_symbol: String,
    #[serde(rename = "p")]
    price: Decimal,
    #[serde(rename = "T")]
    trade_time_ms: i64,
}

/// A parsed live trade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveTick {
    pub symbol: Symbol,
    pub price: Price,
    pub timestamp: DateTime<Utc>,
}

/// Maps exchange stream symbols (e.g. "BTCUSDT") to tracked symbols.
#[derive(Debug, Clone, Default)]
pub struct TradeParser {
    aliases: HashMap<String, Symbol>,
}

impl TradeParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route trades for `stream_symbol` to `symbol`.
    pub fn with_alias(mut self, stream_symbol: &str, symbol: Symbol) -> Self {
        self.aliases.insert(stream_symbol.to_ascii_uppercase(), symbol);
        self
    }

    pub fn stream_symbols(&self) -> impl Iterator<Item = &str> {
        self.aliases.keys().map(String::as_str)
    }

    /// Parse one text frame.
    pub fn parse(&self, text: &str) -> FeedResult<Option<LiveTick>> {
        let value: Value = serde_json::from_str(text)?;
        let body = value.get("data").unwrap_or(&value);

        if body.get("s").is_none() || body.get("p").is_none() {
            return Ok(None);
        }

        let raw = RawTrade::deserialize(body).map_err(|e| FeedError::Parse(e.to_string()))?;

        let symbol = self
            .aliases
            .get(&raw.stream_symbol.to_ascii_uppercase())
            .cloned()
            .ok_or_else(|| FeedError::UnknownSymbol(raw.stream_symbol.clone()))?;

        let timestamp = Utc
            .timestamp_millis_opt(raw.trade_time_ms)
            .single()
            .ok_or_else(|| FeedError::Parse(format!("bad trade time {}", raw.trade_time_ms)))?;

        Ok(Some(LiveTick {
            symbol,
            price: Price::new(raw.price),
            timestamp,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parser() -> TradeParser {
        TradeParser::new().with_alias("btcusdt", Symbol::new("BTC").unwrap())
    }

    #[test]
    fn test_parse_bare_trade() {
        let tick = parser()
            .parse(r#"{"e":"trade","s":"BTCUSDT","p":"65000.10","q":"0.01","T":1700000000000}"#)
            .unwrap()
            .unwrap();
        assert_eq!(tick.symbol.as_str(), "BTC");
        assert_eq!(tick.price, Price::new(dec!(65000.10)));
        assert_eq!(tick.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn test_parse_combined_stream_envelope() {
        let tick = parser()
            .parse(r#"{"stream":"btcusdt@trade","data":{"s":"BTCUSDT","p":65001.5,"T":1700000000001}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(tick.price, Price::new(dec!(65001.5)));
    }

    #[test]
    fn test_non_trade_frame_is_none() {
        assert!(parser().parse(r#"{"result":null,"id":1}"#).unwrap().is_none());
    }

    #[test]
    fn test_unknown_symbol() {
        let err = parser().parse(r#"{"s":"DOGEUSDT","p":"0.1","T":1}"#);
        assert!(matches!(err, Err(FeedError::UnknownSymbol(_))));
    }

    #[test]
    fn test_malformed_price() {
        let err = parser().parse(r#"{"s":"BTCUSDT","p":"abc","T":1}"#);
        assert!(matches!(err, Err(FeedError::Parse(_))));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parser().parse("not json"), Err(FeedError::Json(_))));
    }
}
