//! lagarb: live/reference divergence engine for prediction markets.
//!
//! Orchestrates the pipeline:
//! - live trade feed and reference poller into the `StreamIngestor`
//! - per-symbol detection cycle (`TriggerEngine`)
//! - risk gating (`RiskGate`), decision publishing and paper settlement
//! - priority-ordered dispatch through pre-built order templates
//! - event log and read-only status endpoint

pub mod app;
pub mod config;
pub mod cycle;
pub mod error;
pub mod kill_switch;
pub mod kv;
pub mod sink;

pub use app::Application;
pub use config::{AppConfig, SignerConfig, WatchlistEntry};
pub use cycle::{CycleSummary, SharedState, TradingCycle};
pub use error::{AppError, AppResult};
pub use kill_switch::{ExternalFlags, FlagSource, HttpFlagSource, KillSwitchConfig, KillSwitchPoller};
pub use kv::{DecisionPublisher, KeyValueStore, SharedKvStore};
pub use sink::{ExecutionSink, PaperConfig, PaperExecutionSink, SettledTrade};
