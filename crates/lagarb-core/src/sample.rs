//! Price observations.

use crate::decimal::Price;
use crate::market::Symbol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a price observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    /// Fast exchange feed pushed over a persistent connection.
    Live,
    /// Slower oracle/reference price pulled on a timer.
    Reference,
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// A single price observation. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceSample {
    pub symbol: Symbol,
    pub source: PriceSource,
    pub price: Price,
    pub observed_at: DateTime<Utc>,
}

impl PriceSample {
    pub fn new(symbol: Symbol, source: PriceSource, price: Price, observed_at: DateTime<Utc>) -> Self {
        Self {
            symbol,
            source,
            price,
            observed_at,
        }
    }

    /// Age of the observation relative to `now` in milliseconds (never negative).
    pub fn age_ms_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.observed_at).num_milliseconds().max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    #[test]
    fn test_age_never_negative() {
        let now = Utc::now();
        let sample = PriceSample::new(
            Symbol::new("BTC").unwrap(),
            PriceSource::Live,
            Price::new(dec!(65000)),
            now + Duration::milliseconds(50),
        );
        assert_eq!(sample.age_ms_at(now), 0);
        assert_eq!(sample.age_ms_at(now + Duration::milliseconds(150)), 100);
    }
}
