//! Prediction-market quote book and its poller.
//!
//! Quotes are seeded from configuration and refreshed by `QuotePoller`.
//! Readers that size or mark positions only accept quotes younger than
//! `max_age_ms`.

use crate::error::{FeedError, FeedResult};
use crate::reference::BoxFuture;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use lagarb_core::{MarketId, MarketSide, Price};
use lagarb_telemetry::Metrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Last known share price for one outcome of a market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketQuote {
    pub market_id: MarketId,
    pub side: MarketSide,
    pub price: Price,
    pub updated_at: DateTime<Utc>,
}

impl MarketQuote {
    #[must_use]
    pub fn age_ms(&self, now: DateTime<Utc>) -> i64 {
        (now - self.updated_at).num_milliseconds()
    }
}

/// Last known quote per (market, side).
#[derive(Debug, Default)]
pub struct QuoteBook {
    quotes: DashMap<(MarketId, MarketSide), MarketQuote>,
}

impl QuoteBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a quote. Share prices must lie strictly inside (0, 1).
    pub fn update(&self, market_id: MarketId, side: MarketSide, price: Price) -> FeedResult<()> {
        self.update_at(market_id, side, price, Utc::now())
    }

    pub fn update_at(
        &self,
        market_id: MarketId,
        side: MarketSide,
        price: Price,
        updated_at: DateTime<Utc>,
    ) -> FeedResult<()> {
        if !price.is_probability() {
            return Err(FeedError::InvalidData(format!(
                "quote {price} for {market_id}/{side} outside (0, 1)"
            )));
        }
        let quote = MarketQuote {
            market_id: market_id.clone(),
            side,
            price,
            updated_at,
        };
        self.quotes.insert((market_id, side), quote);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId, side: MarketSide) -> Option<MarketQuote> {
        self.quotes
            .get(&(market_id.clone(), side))
            .map(|q| q.value().clone())
    }

    /// The quote if it is no older than `max_age_ms` at `now`.
    #[must_use]
    pub fn get_fresh(
        &self,
        market_id: &MarketId,
        side: MarketSide,
        now: DateTime<Utc>,
        max_age_ms: i64,
    ) -> Option<MarketQuote> {
        self.get(market_id, side)
            .filter(|q| q.updated_at >= now - ChronoDuration::milliseconds(max_age_ms))
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteConfig {
    /// Poll `url` for fresh quotes; seeds only when false.
    #[serde(default)]
    pub enabled: bool,
    /// Endpoint queried as `GET {url}?market_id={market_id}`.
    #[serde(default = "default_quote_url")]
    pub url: String,
    #[serde(default = "default_quote_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_quote_timeout_ms")]
    pub timeout_ms: u64,
    /// Oldest quote used for sizing or marking.
    #[serde(default = "default_max_age_ms")]
    pub max_age_ms: i64,
}

fn default_quote_url() -> String {
    "http://127.0.0.1:8080/quotes".to_string()
}

fn default_quote_interval_ms() -> u64 {
    1000
}

fn default_quote_timeout_ms() -> u64 {
    500
}

fn default_max_age_ms() -> i64 {
    60_000
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: default_quote_url(),
            interval_ms: default_quote_interval_ms(),
            timeout_ms: default_quote_timeout_ms(),
            max_age_ms: default_max_age_ms(),
        }
    }
}

impl QuoteConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_age_ms <= 0 {
            return Err("quotes max_age_ms must be positive".to_string());
        }
        if !self.enabled {
            return Ok(());
        }
        if self.url.is_empty() {
            return Err("quotes.url is required when enabled".to_string());
        }
        if self.interval_ms == 0 || self.timeout_ms == 0 {
            return Err("quotes interval_ms and timeout_ms must be positive".to_string());
        }
        if self.interval_ms as i64 >= self.max_age_ms {
            return Err("quotes interval_ms must be below max_age_ms".to_string());
        }
        Ok(())
    }
}

/// Share prices for both outcomes of one market. Either side may be absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomePrices {
    #[serde(default)]
    pub yes: Option<Decimal>,
    #[serde(default)]
    pub no: Option<Decimal>,
}

pub trait QuoteSource: Send + Sync {
    fn fetch<'a>(&'a self, market_id: &'a MarketId) -> BoxFuture<'a, FeedResult<OutcomePrices>>;
}

pub struct HttpQuoteSource {
    client: reqwest::Client,
    url: String,
}

impl HttpQuoteSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch_inner(&self, market_id: &MarketId) -> FeedResult<OutcomePrices> {
        Ok(self
            .client
            .get(&self.url)
            .query(&[("market_id", market_id.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

impl QuoteSource for HttpQuoteSource {
    fn fetch<'a>(&'a self, market_id: &'a MarketId) -> BoxFuture<'a, FeedResult<OutcomePrices>> {
        Box::pin(self.fetch_inner(market_id))
    }
}

/// Refreshes the quote book for every watched market on a timer.
pub struct QuotePoller<S: QuoteSource> {
    config: QuoteConfig,
    source: S,
    markets: Vec<MarketId>,
    book: Arc<QuoteBook>,
    shutdown: CancellationToken,
}

impl<S: QuoteSource> QuotePoller<S> {
    pub fn new(
        config: QuoteConfig,
        source: S,
        markets: Vec<MarketId>,
        book: Arc<QuoteBook>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            markets,
            book,
            shutdown,
        }
    }

    /// Fetch every market once. Returns the number of failed markets.
    pub async fn poll_once(&self) -> usize {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut failures = 0;

        for market_id in &self.markets {
            let result = match tokio::time::timeout(timeout, self.source.fetch(market_id)).await {
                Ok(r) => r,
                Err(_) => Err(FeedError::FetchTimeout(self.config.timeout_ms)),
            };

            let recorded = result.and_then(|prices| {
                let sides = [(MarketSide::Yes, prices.yes), (MarketSide::No, prices.no)];
                for (side, price) in sides {
                    if let Some(price) = price {
                        self.book.update(market_id.clone(), side, Price::new(price))?;
                    }
                }
                Ok(())
            });

            if let Err(e) = recorded {
                failures += 1;
                Metrics::quote_poll_failed();
                warn!(%market_id, error = %e, "Quote poll failed");
            }
        }

        failures
    }

    pub async fn run(&self) {
        info!(
            markets = self.markets.len(),
            interval_ms = self.config.interval_ms,
            "Quote poller started"
        );
        let interval = Duration::from_millis(self.config.interval_ms);

        loop {
            let failures = self.poll_once().await;
            if failures > 0 {
                debug!(failures, "Quote poll round incomplete");
            }
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        info!("Quote poller stopped");
    }
}
