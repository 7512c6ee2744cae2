//! Risk gating for the lagarb engine.
//!
//! Every check runs on every evaluation, in a fixed order:
//! - `stale_feed` (hard): live or reference data older than the budget
//! - `kill_switch` (hard): external kill-switch latch
//! - `manipulation_flag` (hard): external manipulation latch
//! - `drawdown` (hard): rolling drawdown over the halt percentage
//! - `regime_too_calm` (soft): detector reported a calm regime
//!
//! Any failing hard check blocks trading. Overrides force a check to pass
//! without hiding it from the result.

pub mod check;
pub mod config;
pub mod error;
pub mod gate;
pub mod latch;

pub use check::{CheckName, RiskCheck, RiskGateResult, Severity};
pub use config::RiskGateConfig;
pub use error::{RiskError, RiskResult};
pub use gate::{RiskGate, RiskInputs, RiskOverride, TradeRecord};
pub use latch::FlagLatch;
