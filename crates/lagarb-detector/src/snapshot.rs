//! Live/reference divergence snapshot.

use crate::error::{DetectorError, DetectorResult};
use chrono::{DateTime, Utc};
use lagarb_core::{Direction, Price, Symbol};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// `delta = live - reference` at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivergenceSnapshot {
    pub symbol: Symbol,
    pub live_price: Price,
    pub reference_price: Price,
    pub delta: Decimal,
    /// Delta as a percentage of the reference price.
    pub delta_pct: Decimal,
    pub computed_at: DateTime<Utc>,
}

impl DivergenceSnapshot {
    pub fn compute(
        symbol: Symbol,
        live_price: Price,
        reference_price: Price,
        computed_at: DateTime<Utc>,
    ) -> DetectorResult<Self> {
        let delta_pct = live_price.pct_from(reference_price).ok_or_else(|| {
            DetectorError::InvalidInput(format!("zero reference price for {symbol}"))
        })?;

        Ok(Self {
            symbol,
            live_price,
            reference_price,
            delta: live_price.inner() - reference_price.inner(),
            delta_pct,
            computed_at,
        })
    }

    /// Divergence in basis points (signed).
    pub fn divergence_bps(&self) -> f64 {
        (self.delta_pct * Decimal::from(100)).to_f64().unwrap_or(0.0)
    }

    /// `Up` when live is above reference; `None` at zero delta.
    pub fn direction(&self) -> Option<Direction> {
        if self.delta.is_zero() {
            None
        } else if self.delta.is_sign_positive() {
            Some(Direction::Up)
        } else {
            Some(Direction::Down)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn snap(live: Decimal, reference: Decimal) -> DivergenceSnapshot {
        DivergenceSnapshot::compute(
            Symbol::new("BTC").unwrap(),
            Price::new(live),
            Price::new(reference),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_delta_and_pct() {
        let s = snap(dec!(101), dec!(100));
        assert_eq!(s.delta, dec!(1));
        assert_eq!(s.delta_pct, dec!(1));
        assert!((s.divergence_bps() - 100.0).abs() < 1e-9);
        assert_eq!(s.direction(), Some(Direction::Up));
    }

    #[test]
    fn test_down_and_zero() {
        assert_eq!(snap(dec!(99), dec!(100)).direction(), Some(Direction::Down));
        assert_eq!(snap(dec!(100), dec!(100)).direction(), None);
    }

    #[test]
    fn test_zero_reference_rejected() {
        let r = DivergenceSnapshot::compute(
            Symbol::new("BTC").unwrap(),
            Price::new(dec!(1)),
            Price::ZERO,
            Utc::now(),
        );
        assert!(r.is_err());
    }
}
