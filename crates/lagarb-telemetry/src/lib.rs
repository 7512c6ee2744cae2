//! Prometheus metrics and structured logging for lagarb.
//!
//! - Prometheus collectors for feeds, detection, risk gating and dispatch
//! - Structured logging with tracing (JSON in production)
//! - Text exposition for the status endpoint

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{gather_text, Metrics};
