//! Rolling window statistics.
//!
//! All values are in basis points relative to the earlier price of each
//! step. The short window is the last `short` ticks; the long window is the
//! last `long` ticks.

use lagarb_core::PriceSample;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowMetrics {
    pub tick_count: usize,
    /// Return over the short window.
    pub short_return_bps: f64,
    /// Return over the long window.
    pub long_return_bps: f64,
    /// Population stddev of tick returns over the short window.
    pub volatility_bps: f64,
    /// Last tick return.
    pub velocity_bps: f64,
    /// Mean tick return of the newer half of the short window minus the older half.
    pub acceleration_bps: f64,
    /// Signed largest single-tick return in the short window.
    pub max_jump_bps: f64,
    /// High-low range of the short window.
    pub short_range_bps: f64,
    /// How far the last price sits outside the prior long-window range;
    /// positive above the high, negative below the low, zero inside.
    pub breakout_bps: f64,
}

fn bps(from: f64, to: f64) -> f64 {
    if from == 0.0 {
        0.0
    } else {
        (to - from) / from * 10_000.0
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

impl WindowMetrics {
    /// Compute from an oldest-first window.
    pub fn compute(window: &[PriceSample], short: usize, long: usize) -> Self {
        let prices: Vec<f64> = window.iter().map(|s| s.price.to_f64()).collect();
        let n = prices.len();
        if n < 2 {
            return Self {
                tick_count: n,
                ..Default::default()
            };
        }

        let last = prices[n - 1];
        let short_slice = &prices[n.saturating_sub(short.max(2))..];
        let long_slice = &prices[n.saturating_sub(long.max(2))..];

        let returns: Vec<f64> = short_slice.windows(2).map(|w| bps(w[0], w[1])).collect();
        let mu = mean(&returns);
        let variance = returns.iter().map(|r| (r - mu).powi(2)).sum::<f64>() / returns.len() as f64;

        let half = returns.len() / 2;
        let acceleration_bps = if half == 0 {
            0.0
        } else {
            mean(&returns[returns.len() - half..]) - mean(&returns[..half])
        };

        let max_jump_bps = returns
            .iter()
            .copied()
            .fold(0.0_f64, |acc, r| if r.abs() > acc.abs() { r } else { acc });

        let short_hi = short_slice.iter().copied().fold(f64::MIN, f64::max);
        let short_lo = short_slice.iter().copied().fold(f64::MAX, f64::min);

        let prior = &long_slice[..long_slice.len() - 1];
        let prior_hi = prior.iter().copied().fold(f64::MIN, f64::max);
        let prior_lo = prior.iter().copied().fold(f64::MAX, f64::min);
        let breakout_bps = if last > prior_hi {
            bps(prior_hi, last)
        } else if last < prior_lo {
            bps(prior_lo, last)
        } else {
            0.0
        };

        Self {
            tick_count: n,
            short_return_bps: bps(short_slice[0], last),
            long_return_bps: bps(long_slice[0], last),
            volatility_bps: variance.sqrt(),
            velocity_bps: returns.last().copied().unwrap_or(0.0),
            acceleration_bps,
            max_jump_bps,
            short_range_bps: bps(short_lo, short_hi),
            breakout_bps,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use lagarb_core::{Price, PriceSource, Symbol};
    use rust_decimal::Decimal;

    pub(crate) fn window_from(prices: &[f64]) -> Vec<PriceSample> {
        let t0 = Utc::now();
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                PriceSample::new(
                    Symbol::new("BTC").unwrap(),
                    PriceSource::Live,
                    Price::new(Decimal::try_from(*p).unwrap()),
                    t0 + Duration::milliseconds(i as i64 * 100),
                )
            })
            .collect()
    }

    #[test]
    fn test_short_window_is_degenerate() {
        let m = WindowMetrics::compute(&window_from(&[100.0]), 20, 120);
        assert_eq!(m.tick_count, 1);
        assert_eq!(m.volatility_bps, 0.0);
    }

    #[test]
    fn test_flat_window() {
        let m = WindowMetrics::compute(&window_from(&[100.0; 30]), 10, 25);
        assert_eq!(m.volatility_bps, 0.0);
        assert_eq!(m.short_return_bps, 0.0);
        assert_eq!(m.breakout_bps, 0.0);
        assert_eq!(m.max_jump_bps, 0.0);
    }

    #[test]
    fn test_returns_and_jump() {
        let mut prices = vec![100.0; 10];
        prices.push(100.2);
        let m = WindowMetrics::compute(&window_from(&prices), 5, 10);
        assert!((m.short_return_bps - 20.0).abs() < 1e-6);
        assert!((m.max_jump_bps - 20.0).abs() < 1e-6);
        assert!((m.velocity_bps - 20.0).abs() < 1e-6);
        assert!((m.breakout_bps - 20.0).abs() < 1e-6);
        assert!(m.acceleration_bps > 0.0);
    }

    #[test]
    fn test_downside_breakout_negative() {
        let mut prices = vec![100.0; 10];
        prices.push(99.9);
        let m = WindowMetrics::compute(&window_from(&prices), 5, 10);
        assert!(m.breakout_bps < 0.0);
        assert!(m.max_jump_bps < 0.0);
    }

    #[test]
    fn test_short_range() {
        let m = WindowMetrics::compute(&window_from(&[100.0, 100.1, 99.9, 100.0]), 4, 10);
        assert!((m.short_range_bps - bps(99.9, 100.1)).abs() < 1e-9);
    }
}
