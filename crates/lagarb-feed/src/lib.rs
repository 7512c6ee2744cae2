//! Price ingestion for the lagarb divergence engine.
//!
//! - `StreamIngestor`: rolling live windows and last reference price per symbol
//! - `LiveFeedConnection`: websocket trade feed with reconnect/backoff
//! - `ReferencePoller`: timed reference price polling over a `ReferenceSource`
//! - `QuoteBook` / `QuotePoller`: prediction-market quotes and their refresh

pub mod connection;
pub mod error;
pub mod ingestor;
pub mod parser;
pub mod quotes;
pub mod reference;

pub use connection::{LiveFeedConfig, LiveFeedConnection};
pub use error::{FeedError, FeedResult};
pub use ingestor::{FeedState, FeedStatus, IngestorConfig, PricePair, ReferenceState, StreamIngestor};
pub use parser::{LiveTick, TradeParser};
pub use quotes::{
    HttpQuoteSource, MarketQuote, OutcomePrices, QuoteBook, QuoteConfig, QuotePoller, QuoteSource,
};
pub use reference::{
    BoxFuture, HttpReferenceSource, ReferencePoller, ReferencePollerConfig, ReferenceQuote,
    ReferenceSource,
};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Install the process-wide TLS crypto provider.
/// Call once before opening any TLS connection.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
