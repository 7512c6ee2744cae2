//! Fractional Kelly sizing for binary outcome markets.
//!
//! Buying at `price` with win probability `p` pays `1 - price` per share on
//! a win, so the full-Kelly fraction is `(p - price) / (1 - price)`.

use lagarb_core::{Price, Size};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingConfig {
    #[serde(default = "default_bankroll_usd")]
    pub bankroll_usd: Decimal,
    /// Multiplier applied to full Kelly.
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: Decimal,
    #[serde(default = "default_max_trade_usd")]
    pub max_trade_usd: Decimal,
    #[serde(default = "default_min_trade_usd")]
    pub min_trade_usd: Decimal,
}

fn default_bankroll_usd() -> Decimal {
    dec!(1000)
}

fn default_kelly_fraction() -> Decimal {
    dec!(0.25)
}

fn default_max_trade_usd() -> Decimal {
    dec!(50)
}

fn default_min_trade_usd() -> Decimal {
    dec!(1)
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            bankroll_usd: default_bankroll_usd(),
            kelly_fraction: default_kelly_fraction(),
            max_trade_usd: default_max_trade_usd(),
            min_trade_usd: default_min_trade_usd(),
        }
    }
}

impl SizingConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.bankroll_usd <= Decimal::ZERO {
            return Err("bankroll_usd must be positive".to_string());
        }
        if self.kelly_fraction <= Decimal::ZERO || self.kelly_fraction > Decimal::ONE {
            return Err("kelly_fraction must be in (0, 1]".to_string());
        }
        if self.min_trade_usd < Decimal::ZERO || self.max_trade_usd < self.min_trade_usd {
            return Err("require 0 <= min_trade_usd <= max_trade_usd".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct KellySizer {
    config: SizingConfig,
}

impl KellySizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SizingConfig {
        &self.config
    }

    /// Model edge: `probability - price`.
    pub fn edge(probability: f64, price: Price) -> f64 {
        probability - price.to_f64()
    }

    /// Notional to commit, rounded down to cents. `None` when there is no
    /// positive edge or the result is under the minimum trade.
    pub fn size(&self, probability: f64, price: Price) -> Option<Size> {
        if !probability.is_finite() || !price.is_probability() {
            return None;
        }
        let p = Decimal::from_f64(probability.clamp(0.0, 1.0))?;
        let edge = p - price.inner();
        if edge <= Decimal::ZERO {
            return None;
        }

        let full_kelly = edge / (Decimal::ONE - price.inner());
        let notional = (full_kelly * self.config.kelly_fraction * self.config.bankroll_usd)
            .min(self.config.max_trade_usd);
        let size = Size::new(notional).round_to_cents();

        (size.inner() >= self.config.min_trade_usd && size.is_positive()).then_some(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_kelly() {
        let sizer = KellySizer::new(SizingConfig {
            max_trade_usd: dec!(1000),
            ..SizingConfig::default()
        });
        // (0.75 - 0.5) / 0.5 = 0.5; * 0.25 * 1000 = 125
        let size = sizer.size(0.75, Price::new(dec!(0.5))).unwrap();
        assert_eq!(size.inner(), dec!(125));
    }

    #[test]
    fn test_capped_at_max() {
        let sizer = KellySizer::default();
        let size = sizer.size(0.95, Price::new(dec!(0.4))).unwrap();
        assert_eq!(size.inner(), dec!(50));
    }

    #[test]
    fn test_no_edge_no_trade() {
        let sizer = KellySizer::default();
        assert!(sizer.size(0.4, Price::new(dec!(0.5))).is_none());
        assert!(sizer.size(0.5, Price::new(dec!(0.5))).is_none());
        assert!(sizer.size(f64::NAN, Price::new(dec!(0.5))).is_none());
        assert!(sizer.size(0.9, Price::new(dec!(1))).is_none());
    }

    #[test]
    fn test_below_minimum() {
        let sizer = KellySizer::default();
        // (0.501 - 0.5) / 0.5 * 0.25 * 1000 = 0.5 < 1
        assert!(sizer.size(0.501, Price::new(dec!(0.5))).is_none());
    }

    #[test]
    fn test_validate() {
        assert!(SizingConfig::default().validate().is_ok());
        let bad = SizingConfig {
            kelly_fraction: dec!(1.5),
            ..SizingConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
