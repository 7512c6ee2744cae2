//! Risk gate configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskGateConfig {
    /// Maximum age of either feed before `stale_feed` blocks.
    #[serde(default = "default_max_feed_staleness_ms")]
    pub max_feed_staleness_ms: i64,
    /// Drawdown (percent of bankroll) at which trading halts.
    #[serde(default = "default_drawdown_halt_pct")]
    pub drawdown_halt_pct: f64,
    /// Trade log lookback for the rolling drawdown.
    #[serde(default = "default_drawdown_window_secs")]
    pub drawdown_window_secs: i64,
    /// Capital the drawdown percentage is measured against.
    #[serde(default = "default_bankroll_usd")]
    pub bankroll_usd: Decimal,
}

fn default_max_feed_staleness_ms() -> i64 {
    2000
}

fn default_drawdown_halt_pct() -> f64 {
    10.0
}

fn default_drawdown_window_secs() -> i64 {
    86_400
}

fn default_bankroll_usd() -> Decimal {
    Decimal::from(1000)
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            max_feed_staleness_ms: default_max_feed_staleness_ms(),
            drawdown_halt_pct: default_drawdown_halt_pct(),
            drawdown_window_secs: default_drawdown_window_secs(),
            bankroll_usd: default_bankroll_usd(),
        }
    }
}

impl RiskGateConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_feed_staleness_ms <= 0 {
            return Err(format!(
                "max_feed_staleness_ms ({}) must be positive",
                self.max_feed_staleness_ms
            ));
        }
        if !(self.drawdown_halt_pct > 0.0 && self.drawdown_halt_pct <= 100.0) {
            return Err(format!(
                "drawdown_halt_pct ({}) must be in (0, 100]",
                self.drawdown_halt_pct
            ));
        }
        if self.drawdown_window_secs <= 0 {
            return Err("drawdown_window_secs must be positive".to_string());
        }
        if self.bankroll_usd <= Decimal::ZERO {
            return Err(format!(
                "bankroll_usd ({}) must be positive",
                self.bankroll_usd
            ));
        }
        Ok(())
    }
}
