//! Detector configuration.

use crate::session::SessionWindow;
use serde::{Deserialize, Serialize};

/// Per-scenario activation thresholds, all in basis points.
///
/// A scenario's confidence climbs linearly through its band as the signal
/// grows from the threshold to twice the threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerThresholds {
    /// Short-window move needed for `liquidation_cascade`.
    #[serde(default = "default_cascade_move_bps")]
    pub cascade_move_bps: f64,
    /// Divergence needed for `oracle_lag`.
    #[serde(default = "default_lag_divergence_bps")]
    pub lag_divergence_bps: f64,
    /// Volatility ceiling for `oracle_lag`.
    #[serde(default = "default_lag_max_volatility_bps")]
    pub lag_max_volatility_bps: f64,
    /// Range break needed for `momentum_breakout`.
    #[serde(default = "default_breakout_bps")]
    pub breakout_bps: f64,
    /// Long-window move needed for `whale_absorption`.
    #[serde(default = "default_absorption_move_bps")]
    pub absorption_move_bps: f64,
    /// Short-window range ceiling for `whale_absorption`.
    #[serde(default = "default_absorption_stall_bps")]
    pub absorption_stall_bps: f64,
    /// Single-tick jump needed for `order_book_cliff`.
    #[serde(default = "default_cliff_jump_bps")]
    pub cliff_jump_bps: f64,
}

fn default_cascade_move_bps() -> f64 {
    25.0
}

fn default_lag_divergence_bps() -> f64 {
    15.0
}

fn default_lag_max_volatility_bps() -> f64 {
    5.0
}

fn default_breakout_bps() -> f64 {
    5.0
}

fn default_absorption_move_bps() -> f64 {
    30.0
}

fn default_absorption_stall_bps() -> f64 {
    3.0
}

fn default_cliff_jump_bps() -> f64 {
    10.0
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            cascade_move_bps: default_cascade_move_bps(),
            lag_divergence_bps: default_lag_divergence_bps(),
            lag_max_volatility_bps: default_lag_max_volatility_bps(),
            breakout_bps: default_breakout_bps(),
            absorption_move_bps: default_absorption_move_bps(),
            absorption_stall_bps: default_absorption_stall_bps(),
            cliff_jump_bps: default_cliff_jump_bps(),
        }
    }
}

/// Configuration for divergence detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorConfig {
    /// Divergence below this (abs, bps) is no divergence at all.
    #[serde(default = "default_divergence_threshold_bps")]
    pub divergence_threshold_bps: f64,
    /// Ticks in the short window.
    #[serde(default = "default_short_window_ticks")]
    pub short_window_ticks: usize,
    /// Ticks in the long window.
    #[serde(default = "default_long_window_ticks")]
    pub long_window_ticks: usize,
    /// Regime check: minimum realized volatility (bps per tick).
    #[serde(default = "default_min_volatility_bps")]
    pub min_volatility_bps: f64,
    /// Regime check: minimum ticks in the window.
    #[serde(default = "default_min_ticks")]
    pub min_ticks: usize,
    /// Active trading sessions (UTC). Empty means always open.
    #[serde(default)]
    pub sessions: Vec<SessionWindow>,
    #[serde(default)]
    pub triggers: TriggerThresholds,
}

fn default_divergence_threshold_bps() -> f64 {
    10.0
}

fn default_short_window_ticks() -> usize {
    20
}

fn default_long_window_ticks() -> usize {
    120
}

fn default_min_volatility_bps() -> f64 {
    0.5
}

fn default_min_ticks() -> usize {
    20
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            divergence_threshold_bps: default_divergence_threshold_bps(),
            short_window_ticks: default_short_window_ticks(),
            long_window_ticks: default_long_window_ticks(),
            min_volatility_bps: default_min_volatility_bps(),
            min_ticks: default_min_ticks(),
            sessions: Vec::new(),
            triggers: TriggerThresholds::default(),
        }
    }
}

impl DetectorConfig {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.divergence_threshold_bps.is_finite() && self.divergence_threshold_bps > 0.0) {
            return Err(format!(
                "divergence_threshold_bps ({}) must be positive",
                self.divergence_threshold_bps
            ));
        }
        if self.short_window_ticks < 3 {
            return Err("short_window_ticks must be at least 3".to_string());
        }
        if self.long_window_ticks <= self.short_window_ticks {
            return Err(format!(
                "long_window_ticks ({}) must exceed short_window_ticks ({})",
                self.long_window_ticks, self.short_window_ticks
            ));
        }
        if self.min_volatility_bps < 0.0 {
            return Err("min_volatility_bps must be non-negative".to_string());
        }

        let t = &self.triggers;
        for (name, value) in [
            ("cascade_move_bps", t.cascade_move_bps),
            ("lag_divergence_bps", t.lag_divergence_bps),
            ("lag_max_volatility_bps", t.lag_max_volatility_bps),
            ("breakout_bps", t.breakout_bps),
            ("absorption_move_bps", t.absorption_move_bps),
            ("absorption_stall_bps", t.absorption_stall_bps),
            ("cliff_jump_bps", t.cliff_jump_bps),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} ({value}) must be positive"));
            }
        }

        for window in &self.sessions {
            window.validate()?;
        }

        Ok(())
    }
}
