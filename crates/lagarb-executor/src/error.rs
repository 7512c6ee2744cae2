//! Executor error types.

use lagarb_core::{MarketId, MarketSide};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template was evicted or replaced after it was read.
    #[error("Template for {market_id}/{side} (nonce {nonce}) is no longer resident")]
    TemplateEvicted {
        market_id: MarketId,
        side: MarketSide,
        nonce: u64,
    },

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Amount overflow: {0}")]
    AmountOverflow(String),
}
