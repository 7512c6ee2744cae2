//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feed error: {0}")]
    Feed(#[from] lagarb_feed::FeedError),

    #[error("Core error: {0}")]
    Core(#[from] lagarb_core::CoreError),

    #[error("Risk error: {0}")]
    Risk(#[from] lagarb_risk::RiskError),

    #[error("Template error: {0}")]
    Template(#[from] lagarb_executor::TemplateError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] lagarb_telemetry::TelemetryError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] lagarb_persistence::PersistenceError),

    #[error("Status server error: {0}")]
    Dashboard(#[from] lagarb_dashboard::DashboardError),

    #[error("Execution sink error: {0}")]
    Sink(String),

    #[error("Kill switch source error: {0}")]
    FlagSource(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Task failed: {0}")]
    Task(String),
}

impl AppError {
    /// Errors that must stop the engine rather than skip a cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Risk(lagarb_risk::RiskError::InvariantViolation(_))
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;
