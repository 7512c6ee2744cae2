//! The five trigger scenarios and confluence resolution.

use crate::config::TriggerThresholds;
use crate::metrics::WindowMetrics;
use crate::snapshot::DivergenceSnapshot;
use lagarb_core::Direction;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named trigger scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    LiquidationCascade,
    OracleLag,
    MomentumBreakout,
    WhaleAbsorption,
    OrderBookCliff,
}

impl TriggerType {
    /// Evaluation order.
    pub const ALL: [TriggerType; 5] = [
        TriggerType::LiquidationCascade,
        TriggerType::OracleLag,
        TriggerType::MomentumBreakout,
        TriggerType::WhaleAbsorption,
        TriggerType::OrderBookCliff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LiquidationCascade => "liquidation_cascade",
            Self::OracleLag => "oracle_lag",
            Self::MomentumBreakout => "momentum_breakout",
            Self::WhaleAbsorption => "whale_absorption",
            Self::OrderBookCliff => "order_book_cliff",
        }
    }

    /// Inclusive confidence band (low, high).
    pub fn band(&self) -> (f64, f64) {
        match self {
            Self::LiquidationCascade => (80.0, 95.0),
            Self::OracleLag => (65.0, 85.0),
            Self::MomentumBreakout => (60.0, 80.0),
            Self::WhaleAbsorption => (55.0, 75.0),
            Self::OrderBookCliff => (50.0, 65.0),
        }
    }

    /// Confidence for a signal of `strength` against `threshold`: the band
    /// low at the threshold, the band high at twice the threshold or more.
    fn confidence(&self, strength: f64, threshold: f64) -> f64 {
        let (lo, hi) = self.band();
        let t = ((strength - threshold) / threshold).clamp(0.0, 1.0);
        lo + (hi - lo) * t
    }

    /// Evaluate this scenario. Returns a hit or nothing.
    pub fn evaluate(
        &self,
        snapshot: &DivergenceSnapshot,
        m: &WindowMetrics,
        t: &TriggerThresholds,
    ) -> Option<TriggerHit> {
        let divergence = snapshot.direction()?;
        let (direction, strength, threshold) = match self {
            Self::LiquidationCascade => {
                let dir = Direction::from_sign(m.short_return_bps)?;
                let accelerating = Direction::from_sign(m.acceleration_bps) == Some(dir);
                if m.short_return_bps.abs() < t.cascade_move_bps || !accelerating || dir != divergence {
                    return None;
                }
                (dir, m.short_return_bps.abs(), t.cascade_move_bps)
            }
            Self::OracleLag => {
                let div = snapshot.divergence_bps().abs();
                if div < t.lag_divergence_bps || m.volatility_bps > t.lag_max_volatility_bps {
                    return None;
                }
                (divergence, div, t.lag_divergence_bps)
            }
            Self::MomentumBreakout => {
                let dir = Direction::from_sign(m.breakout_bps)?;
                if m.breakout_bps.abs() < t.breakout_bps || dir != divergence {
                    return None;
                }
                (dir, m.breakout_bps.abs(), t.breakout_bps)
            }
            Self::WhaleAbsorption => {
                // A large move that has stalled is being absorbed; expect a fade.
                let moved = Direction::from_sign(m.long_return_bps)?;
                if m.long_return_bps.abs() < t.absorption_move_bps
                    || m.short_range_bps > t.absorption_stall_bps
                {
                    return None;
                }
                (moved.opposite(), m.long_return_bps.abs(), t.absorption_move_bps)
            }
            Self::OrderBookCliff => {
                let dir = Direction::from_sign(m.max_jump_bps)?;
                if m.max_jump_bps.abs() < t.cliff_jump_bps {
                    return None;
                }
                (dir, m.max_jump_bps.abs(), t.cliff_jump_bps)
            }
        };

        Some(TriggerHit {
            trigger_type: *self,
            direction,
            confidence: self.confidence(strength, threshold),
        })
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One scenario firing in one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TriggerHit {
    pub trigger_type: TriggerType,
    pub direction: Direction,
    /// 0-100.
    pub confidence: f64,
}

/// Result of combining the hits of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum Confluence {
    None,
    /// Exactly one hit.
    Single(TriggerHit),
    /// Two or more hits agree. `lead` is the highest-confidence one.
    Agreed {
        lead: TriggerHit,
        agreeing: Vec<TriggerType>,
    },
    /// Hits disagree and no direction has two or more.
    Conflicting,
}

/// Combine hits: a direction backed by two or more hits wins with the
/// maximum confidence among them; a lone hit passes unboosted.
pub fn resolve_confluence(hits: &[TriggerHit]) -> Confluence {
    match hits {
        [] => return Confluence::None,
        [only] => return Confluence::Single(*only),
        _ => {}
    }

    let side = |dir: Direction| -> Vec<TriggerHit> {
        hits.iter().copied().filter(|h| h.direction == dir).collect()
    };
    let up = side(Direction::Up);
    let down = side(Direction::Down);

    let winners = match (up.len() >= 2, down.len() >= 2) {
        (true, false) => up,
        (false, true) => down,
        (true, true) => {
            // Both sides confirmed: the stronger lead decides, ties are conflicting.
            let best = |v: &[TriggerHit]| v.iter().map(|h| h.confidence).fold(0.0, f64::max);
            let (u, d) = (best(&up[..]), best(&down[..]));
            if u > d {
                up
            } else if d > u {
                down
            } else {
                return Confluence::Conflicting;
            }
        }
        (false, false) => return Confluence::Conflicting,
    };

    let lead = winners
        .iter()
        .copied()
        .fold(winners[0], |best, h| if h.confidence > best.confidence { h } else { best });

    Confluence::Agreed {
        lead,
        agreeing: winners.iter().map(|h| h.trigger_type).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lagarb_core::{Price, Symbol};
    use rust_decimal::Decimal;

    fn hit(trigger_type: TriggerType, direction: Direction, confidence: f64) -> TriggerHit {
        TriggerHit {
            trigger_type,
            direction,
            confidence,
        }
    }

    fn snapshot_bps(bps: f64) -> DivergenceSnapshot {
        let reference = 10_000.0;
        let live = reference + bps;
        DivergenceSnapshot::compute(
            Symbol::new("BTC").unwrap(),
            Price::new(Decimal::try_from(live).unwrap()),
            Price::new(Decimal::try_from(reference).unwrap()),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_confidence_scales_within_band() {
        let tt = TriggerType::OracleLag;
        assert_eq!(tt.confidence(15.0, 15.0), 65.0);
        assert_eq!(tt.confidence(30.0, 15.0), 85.0);
        assert_eq!(tt.confidence(100.0, 15.0), 85.0);
        assert!((tt.confidence(22.5, 15.0) - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_oracle_lag_fires_in_quiet_market() {
        let snap = snapshot_bps(20.0);
        let m = WindowMetrics {
            volatility_bps: 1.0,
            ..Default::default()
        };
        let h = TriggerType::OracleLag
            .evaluate(&snap, &m, &TriggerThresholds::default())
            .unwrap();
        assert_eq!(h.direction, Direction::Up);
        assert!(h.confidence >= 65.0 && h.confidence <= 85.0);

        let noisy = WindowMetrics {
            volatility_bps: 10.0,
            ..Default::default()
        };
        assert!(TriggerType::OracleLag
            .evaluate(&snap, &noisy, &TriggerThresholds::default())
            .is_none());
    }

    #[test]
    fn test_cascade_requires_acceleration_and_agreement() {
        let t = TriggerThresholds::default();
        let m = WindowMetrics {
            short_return_bps: -40.0,
            acceleration_bps: -3.0,
            ..Default::default()
        };
        let down = snapshot_bps(-20.0);
        let h = TriggerType::LiquidationCascade.evaluate(&down, &m, &t).unwrap();
        assert_eq!(h.direction, Direction::Down);
        assert!(h.confidence >= 80.0);

        let up = snapshot_bps(20.0);
        assert!(TriggerType::LiquidationCascade.evaluate(&up, &m, &t).is_none());

        let decelerating = WindowMetrics {
            acceleration_bps: 2.0,
            ..m
        };
        assert!(TriggerType::LiquidationCascade
            .evaluate(&down, &decelerating, &t)
            .is_none());
    }

    #[test]
    fn test_whale_absorption_fades_the_move() {
        let m = WindowMetrics {
            long_return_bps: 45.0,
            short_range_bps: 1.0,
            ..Default::default()
        };
        let h = TriggerType::WhaleAbsorption
            .evaluate(&snapshot_bps(20.0), &m, &TriggerThresholds::default())
            .unwrap();
        assert_eq!(h.direction, Direction::Down);
    }

    #[test]
    fn test_zero_divergence_never_fires() {
        let m = WindowMetrics {
            short_return_bps: 100.0,
            acceleration_bps: 10.0,
            max_jump_bps: 100.0,
            breakout_bps: 100.0,
            ..Default::default()
        };
        let snap = snapshot_bps(0.0);
        for tt in TriggerType::ALL {
            assert!(tt.evaluate(&snap, &m, &TriggerThresholds::default()).is_none());
        }
    }

    #[test]
    fn test_confluence_none_and_single() {
        assert_eq!(resolve_confluence(&[]), Confluence::None);
        let h = hit(TriggerType::OrderBookCliff, Direction::Up, 55.0);
        assert_eq!(resolve_confluence(&[h]), Confluence::Single(h));
    }

    #[test]
    fn test_confluence_takes_max_without_boost() {
        let hits = [
            hit(TriggerType::OracleLag, Direction::Up, 70.0),
            hit(TriggerType::MomentumBreakout, Direction::Up, 78.0),
            hit(TriggerType::OrderBookCliff, Direction::Down, 60.0),
        ];
        match resolve_confluence(&hits) {
            Confluence::Agreed { lead, agreeing } => {
                assert_eq!(lead.trigger_type, TriggerType::MomentumBreakout);
                assert_eq!(lead.confidence, 78.0);
                assert_eq!(
                    agreeing,
                    vec![TriggerType::OracleLag, TriggerType::MomentumBreakout]
                );
            }
            other => panic!("expected agreement, got {other:?}"),
        }
    }

    #[test]
    fn test_confluence_conflicting() {
        let hits = [
            hit(TriggerType::OracleLag, Direction::Up, 70.0),
            hit(TriggerType::WhaleAbsorption, Direction::Down, 60.0),
        ];
        assert_eq!(resolve_confluence(&hits), Confluence::Conflicting);
    }
}
