//! Read-only status endpoint for the lagarb engine.
//!
//! ```text
//! GET /status   -> StatusSnapshot (feed, divergences, last verdict, queue, cache)
//! GET /health   -> liveness plus the current trading verdict
//! GET /metrics  -> prometheus text exposition
//! ```

mod config;
mod error;
mod server;
mod state;
mod types;

pub use config::StatusConfig;
pub use error::{DashboardError, DashboardResult};
pub use server::{create_router, run_server};
pub use state::StatusState;
pub use types::{DivergenceView, ErrorView, HealthResponse, StatusSnapshot};
