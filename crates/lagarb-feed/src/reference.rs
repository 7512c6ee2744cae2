//! Reference price polling.
//!
//! The reference price is pulled on a fixed timer. Each fetch is bounded by a
//! timeout; failures are counted and logged, and consecutive failures stretch
//! the next wait up to a cap.

use crate::connection::backoff_delay;
use crate::error::{FeedError, FeedResult};
use crate::ingestor::StreamIngestor;
use chrono::{DateTime, TimeZone, Utc};
use lagarb_core::{Price, Symbol};
use lagarb_telemetry::Metrics;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Boxed future for dyn-compatible async trait methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// One reference observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceQuote {
    pub price: Price,
    /// Source timestamp when provided, else the receive time.
    pub observed_at: DateTime<Utc>,
}

/// Source of reference prices.
pub trait ReferenceSource: Send + Sync {
    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, FeedResult<ReferenceQuote>>;
}

/// Poller configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferencePollerConfig {
    /// Endpoint queried as `GET {url}?symbol={symbol}`.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

fn default_url() -> String {
    "http://127.0.0.1:8080/reference".to_string()
}

fn default_interval_ms() -> u64 {
    500
}

fn default_timeout_ms() -> u64 {
    400
}

fn default_max_backoff_ms() -> u64 {
    5000
}

impl Default for ReferencePollerConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl ReferencePollerConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_ms == 0 {
            return Err("reference interval_ms must be positive".to_string());
        }
        if self.timeout_ms == 0 || self.timeout_ms > self.interval_ms * 10 {
            return Err("reference timeout_ms must be in (0, 10 * interval_ms]".to_string());
        }
        if self.max_backoff_ms < self.interval_ms {
            return Err("reference max_backoff_ms must be >= interval_ms".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ReferenceResponse {
    price: Decimal,
    #[serde(default)]
    timestamp: Option<i64>,
}

/// Reference source over HTTP.
pub struct HttpReferenceSource {
    client: reqwest::Client,
    url: String,
}

impl HttpReferenceSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> FeedResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch_inner(&self, symbol: &Symbol) -> FeedResult<ReferenceQuote> {
        let body: ReferenceResponse = self
            .client
            .get(&self.url)
            .query(&[("symbol", symbol.as_str())])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let observed_at = match body.timestamp {
            Some(ms) => Utc
                .timestamp_millis_opt(ms)
                .single()
                .ok_or_else(|| FeedError::Parse(format!("bad reference timestamp {ms}")))?,
            None => Utc::now(),
        };

        Ok(ReferenceQuote {
            price: Price::new(body.price),
            observed_at,
        })
    }
}

impl ReferenceSource for HttpReferenceSource {
    fn fetch<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, FeedResult<ReferenceQuote>> {
        Box::pin(self.fetch_inner(symbol))
    }
}

/// Polls a `ReferenceSource` for every tracked symbol.
pub struct ReferencePoller<S: ReferenceSource> {
    config: ReferencePollerConfig,
    source: S,
    symbols: Vec<Symbol>,
    ingestor: Arc<StreamIngestor>,
    shutdown: CancellationToken,
}

impl<S: ReferenceSource> ReferencePoller<S> {
    pub fn new(
        config: ReferencePollerConfig,
        source: S,
        symbols: Vec<Symbol>,
        ingestor: Arc<StreamIngestor>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            symbols,
            ingestor,
            shutdown,
        }
    }

    /// Fetch every symbol once. Returns the number of failed fetches.
    pub async fn poll_once(&self) -> usize {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let mut failures = 0;

        for symbol in &self.symbols {
            let result = match tokio::time::timeout(timeout, self.source.fetch(symbol)).await {
                Ok(r) => r,
                Err(_) => Err(FeedError::FetchTimeout(self.config.timeout_ms)),
            };

            let recorded = result.and_then(|quote| {
                self.ingestor
                    .record_reference(symbol, quote.price, quote.observed_at)
            });

            if let Err(e) = recorded {
                failures += 1;
                Metrics::reference_poll_failed(symbol.as_str());
                warn!(%symbol, error = %e, "Reference poll failed");
            }
        }

        failures
    }

    /// Wait before the next round after `consecutive_failures` failed rounds.
    fn next_wait(&self, consecutive_failures: u32) -> Duration {
        if consecutive_failures == 0 {
            return Duration::from_millis(self.config.interval_ms);
        }
        backoff_delay(
            self.config.interval_ms,
            self.config.max_backoff_ms,
            consecutive_failures + 1,
            0,
        )
    }

    /// Poll until the shutdown token is cancelled.
    pub async fn run(&self) {
        info!(
            symbols = self.symbols.len(),
            interval_ms = self.config.interval_ms,
            "Reference poller started"
        );
        let mut consecutive_failures = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if self.poll_once().await > 0 {
                consecutive_failures = consecutive_failures.saturating_add(1);
            } else {
                if consecutive_failures > 0 {
                    debug!(consecutive_failures, "Reference poll recovered");
                }
                consecutive_failures = 0;
            }

            tokio::select! {
                () = tokio::time::sleep(self.next_wait(consecutive_failures)) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        info!("Reference poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingestor::IngestorConfig;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    struct ScriptedSource {
        replies: Mutex<VecDeque<FeedResult<Decimal>>>,
        delay: Option<Duration>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<FeedResult<Decimal>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                delay: None,
            }
        }
    }

    impl ReferenceSource for ScriptedSource {
        fn fetch<'a>(&'a self, _symbol: &'a Symbol) -> BoxFuture<'a, FeedResult<ReferenceQuote>> {
            Box::pin(async move {
                if let Some(d) = self.delay {
                    tokio::time::sleep(d).await;
                }
                let next = self
                    .replies
                    .lock()
                    .pop_front()
                    .unwrap_or_else(|| Err(FeedError::InvalidData("exhausted".to_string())));
                next.map(|p| ReferenceQuote {
                    price: Price::new(p),
                    observed_at: Utc::now(),
                })
            })
        }
    }

    fn poller(source: ScriptedSource, timeout_ms: u64) -> (ReferencePoller<ScriptedSource>, Arc<StreamIngestor>) {
        let ingestor = Arc::new(StreamIngestor::new(IngestorConfig::default()));
        let config = ReferencePollerConfig {
            timeout_ms,
            ..Default::default()
        };
        let poller = ReferencePoller::new(
            config,
            source,
            vec![Symbol::new("BTC").unwrap()],
            ingestor.clone(),
            CancellationToken::new(),
        );
        (poller, ingestor)
    }

    #[tokio::test]
    async fn test_poll_records_reference() {
        let (poller, ingestor) = poller(ScriptedSource::new(vec![Ok(dec!(64990))]), 400);
        assert_eq!(poller.poll_once().await, 0);
        let btc = Symbol::new("BTC").unwrap();
        assert_eq!(
            ingestor.reference(&btc).unwrap().sample.price,
            Price::new(dec!(64990))
        );
    }

    #[tokio::test]
    async fn test_failure_keeps_last_value() {
        let (poller, ingestor) = poller(
            ScriptedSource::new(vec![
                Ok(dec!(64990)),
                Err(FeedError::InvalidData("boom".to_string())),
            ]),
            400,
        );
        assert_eq!(poller.poll_once().await, 0);
        assert_eq!(poller.poll_once().await, 1);
        let btc = Symbol::new("BTC").unwrap();
        assert_eq!(
            ingestor.reference(&btc).unwrap().sample.price,
            Price::new(dec!(64990))
        );
    }

    #[tokio::test]
    async fn test_slow_fetch_times_out() {
        let mut source = ScriptedSource::new(vec![Ok(dec!(1))]);
        source.delay = Some(Duration::from_millis(200));
        let (poller, ingestor) = poller(source, 20);
        assert_eq!(poller.poll_once().await, 1);
        assert!(ingestor.reference(&Symbol::new("BTC").unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_non_positive_reference_counts_as_failure() {
        let (poller, _) = poller(ScriptedSource::new(vec![Ok(dec!(0))]), 400);
        assert_eq!(poller.poll_once().await, 1);
    }

    #[test]
    fn test_next_wait_backs_off_with_cap() {
        let (poller, _) = poller(ScriptedSource::new(vec![]), 400);
        assert_eq!(poller.next_wait(0), Duration::from_millis(500));
        assert_eq!(poller.next_wait(1), Duration::from_millis(1000));
        assert_eq!(poller.next_wait(2), Duration::from_millis(2000));
        assert_eq!(poller.next_wait(10), Duration::from_millis(5000));
    }

    #[test]
    fn test_response_accepts_string_or_number() {
        let a: ReferenceResponse = serde_json::from_str(r#"{"price":"64990.5"}"#).unwrap();
        let b: ReferenceResponse =
            serde_json::from_str(r#"{"price":64990.5,"timestamp":1700000000000}"#).unwrap();
        assert_eq!(a.price, b.price);
        assert_eq!(b.timestamp, Some(1_700_000_000_000));
    }
}
