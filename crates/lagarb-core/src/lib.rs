//! Core domain types for the lagarb divergence engine.
//!
//! This crate provides the value types shared by every stage of the pipeline:
//! - `Symbol`: Underlying asset tracked by the live and reference feeds
//! - `Price`, `Size`: Precision-safe numeric types
//! - `PriceSample`: Immutable observation from the live or reference source
//! - `MarketId`, `TokenId`, `MarketSide`: Prediction-market identifiers
//! - `Direction`: Expected move of the reference price

pub mod decimal;
pub mod error;
pub mod market;
pub mod sample;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{Direction, MarketId, MarketSide, Symbol, TokenId};
pub use sample::{PriceSample, PriceSource};
