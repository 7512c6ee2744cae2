//! Trade dispatch for the lagarb engine.
//!
//! - `TradePriorityQueue`: bounded queue ordered by a composite urgency score
//! - `PriorityScorer`: the score, computed once per candidate
//! - `OrderTemplateCache`: pre-built order skeletons per (market, side)
//! - `NonceManager`: monotonic nonces for templates
//! - `OrderPayload`: the ready-to-submit order JSON
//! - `KellySizer`: fractional Kelly position sizing

pub mod error;
pub mod nonce;
pub mod payload;
pub mod queue;
pub mod scorer;
pub mod sizing;
pub mod template;

pub use error::TemplateError;
pub use nonce::{Clock, NonceManager, SystemClock};
pub use payload::{OrderFields, OrderMetadata, OrderPayload, AMOUNT_SCALE};
pub use queue::{
    CandidateDraft, EnqueueOutcome, QueueStats, RejectReason, TradeCandidate, TradePriorityQueue,
};
pub use scorer::{PriorityScorer, ScorerConfig, ScoringWeights};
pub use sizing::{KellySizer, SizingConfig};
pub use template::{OrderTemplate, OrderTemplateCache, TemplateConfig};
