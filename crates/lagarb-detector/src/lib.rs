//! Divergence detection for the lagarb engine.
//!
//! Each cycle compares the latest live price against the reference price,
//! derives window metrics, and runs the fixed gate sequence:
//! regime -> session -> five trigger scenarios -> confluence.
//! The result is at most one `EdgeDecision` per symbol per cycle.

pub mod config;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod session;
pub mod snapshot;
pub mod triggers;

pub use config::{DetectorConfig, TriggerThresholds};
pub use engine::{CycleOutcome, CycleReport, EdgeDecision, SupportingMetrics, TriggerEngine};
pub use error::{DetectorError, DetectorResult};
pub use metrics::WindowMetrics;
pub use session::{SessionSchedule, SessionWindow};
pub use snapshot::DivergenceSnapshot;
pub use triggers::{resolve_confluence, Confluence, TriggerHit, TriggerType};
