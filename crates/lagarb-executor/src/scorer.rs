//! Composite priority score.
//!
//! `score = -(wc*c + we*e + wu*u + wl*l)`, each component in [0, 1]:
//! - `c = confidence / 100`
//! - `e = min(|edge| / edge_cap, 1)`
//! - `u = 1 / (1 + hours / half_life)`, 1.0 at or past resolution
//! - `l = min(ln(1 + volume) / ln(1 + liquidity_cap), 1)`
//!
//! Lower scores dequeue first.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_confidence_weight")]
    pub confidence: f64,
    #[serde(default = "default_edge_weight")]
    pub edge: f64,
    #[serde(default = "default_urgency_weight")]
    pub urgency: f64,
    #[serde(default = "default_liquidity_weight")]
    pub liquidity: f64,
}

fn default_confidence_weight() -> f64 {
    0.40
}

fn default_edge_weight() -> f64 {
    0.30
}

fn default_urgency_weight() -> f64 {
    0.20
}

fn default_liquidity_weight() -> f64 {
    0.10
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            confidence: default_confidence_weight(),
            edge: default_edge_weight(),
            urgency: default_urgency_weight(),
            liquidity: default_liquidity_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Edge at which the edge component saturates.
    #[serde(default = "default_edge_cap")]
    pub edge_cap: f64,
    /// Hours to resolution at which urgency halves.
    #[serde(default = "default_urgency_half_life_hours")]
    pub urgency_half_life_hours: f64,
    /// 24h volume (USD) at which liquidity saturates.
    #[serde(default = "default_liquidity_cap_usd")]
    pub liquidity_cap_usd: f64,
}

fn default_edge_cap() -> f64 {
    0.25
}

fn default_urgency_half_life_hours() -> f64 {
    24.0
}

fn default_liquidity_cap_usd() -> f64 {
    1_000_000.0
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            weights: ScoringWeights::default(),
            edge_cap: default_edge_cap(),
            urgency_half_life_hours: default_urgency_half_life_hours(),
            liquidity_cap_usd: default_liquidity_cap_usd(),
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<(), String> {
        let w = &self.weights;
        let parts = [w.confidence, w.edge, w.urgency, w.liquidity];
        if parts.iter().any(|x| !x.is_finite() || *x < 0.0) {
            return Err("scoring weights must be finite and non-negative".to_string());
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-9 {
            return Err(format!("scoring weights sum to {sum}, expected 1"));
        }
        if !(self.edge_cap > 0.0) {
            return Err("edge_cap must be positive".to_string());
        }
        if !(self.urgency_half_life_hours > 0.0) {
            return Err("urgency_half_life_hours must be positive".to_string());
        }
        if !(self.liquidity_cap_usd > 0.0) {
            return Err("liquidity_cap_usd must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct PriorityScorer {
    config: ScorerConfig,
}

impl PriorityScorer {
    pub fn new(config: ScorerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Score a candidate. `None` when any input is non-finite.
    pub fn score(
        &self,
        confidence: f64,
        edge: f64,
        hours_to_resolution: f64,
        volume_24h: f64,
    ) -> Option<f64> {
        if ![confidence, edge, hours_to_resolution, volume_24h]
            .iter()
            .all(|x| x.is_finite())
        {
            return None;
        }

        let c = (confidence / 100.0).clamp(0.0, 1.0);
        let e = (edge.abs() / self.config.edge_cap).min(1.0);
        let u = 1.0 / (1.0 + hours_to_resolution.max(0.0) / self.config.urgency_half_life_hours);
        let l = ((1.0 + volume_24h.max(0.0)).ln() / (1.0 + self.config.liquidity_cap_usd).ln())
            .min(1.0);

        let w = &self.config.weights;
        Some(-(w.confidence * c + w.edge * e + w.urgency * u + w.liquidity * l))
    }
}

impl Default for PriorityScorer {
    fn default() -> Self {
        Self::new(ScorerConfig::default())
    }
}
