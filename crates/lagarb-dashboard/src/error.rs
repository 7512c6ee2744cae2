//! Status server errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("Invalid listen address: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
