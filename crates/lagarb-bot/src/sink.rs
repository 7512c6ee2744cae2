//! Execution collaborator boundary.

use crate::error::AppResult;
use chrono::{DateTime, Duration, Utc};
use lagarb_core::{MarketId, MarketSide, Price};
use lagarb_executor::OrderPayload;
use lagarb_feed::{BoxFuture, QuoteBook};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

/// A closed position and its realized PnL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettledTrade {
    pub market_id: MarketId,
    pub side: MarketSide,
    pub entry_price: Price,
    pub exit_price: Price,
    pub shares: Decimal,
    pub pnl_usd: Decimal,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// Receives ready-to-submit orders. Implementations own signing and
/// transport.
pub trait ExecutionSink: Send + Sync {
    fn submit<'a>(&'a self, payload: &'a OrderPayload) -> BoxFuture<'a, AppResult<()>>;

    /// Close whatever positions are due at `now` and report their realized
    /// PnL. Quotes older than `max_quote_age_ms` must not be used to mark.
    fn settle<'a>(
        &'a self,
        quotes: &'a QuoteBook,
        now: DateTime<Utc>,
        max_quote_age_ms: i64,
    ) -> BoxFuture<'a, AppResult<Vec<SettledTrade>>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    /// Seconds a paper position is held before it is marked and closed.
    #[serde(default = "default_hold_secs")]
    pub hold_secs: i64,
}

fn default_hold_secs() -> i64 {
    300
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            hold_secs: default_hold_secs(),
        }
    }
}

impl PaperConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.hold_secs < 0 {
            return Err("paper hold_secs must not be negative".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct PaperPosition {
    market_id: MarketId,
    side: MarketSide,
    entry_price: Price,
    shares: Decimal,
    opened_at: DateTime<Utc>,
}

const RECENT_CAPACITY: usize = 100;

/// Paper trading: every order fills at its limit price and is closed at the
/// quote book price once the hold time has passed.
#[derive(Default)]
pub struct PaperExecutionSink {
    config: PaperConfig,
    submitted: AtomicU64,
    recent: Mutex<VecDeque<OrderPayload>>,
    open: Mutex<Vec<PaperPosition>>,
}

impl PaperExecutionSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PaperConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Most recent payloads, oldest first.
    #[must_use]
    pub fn recent(&self) -> Vec<OrderPayload> {
        self.recent.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn open_positions(&self) -> usize {
        self.open.lock().len()
    }

    fn close_due(
        &self,
        quotes: &QuoteBook,
        now: DateTime<Utc>,
        max_quote_age_ms: i64,
    ) -> Vec<SettledTrade> {
        let hold = Duration::seconds(self.config.hold_secs);
        let mut settled = Vec::new();

        self.open.lock().retain(|position| {
            if now < position.opened_at + hold {
                return true;
            }
            let Some(quote) =
                quotes.get_fresh(&position.market_id, position.side, now, max_quote_age_ms)
            else {
                debug!(
                    market_id = %position.market_id,
                    side = %position.side,
                    "No fresh quote, position stays open"
                );
                return true;
            };

            let pnl_usd = position.shares * (quote.price.inner() - position.entry_price.inner());
            settled.push(SettledTrade {
                market_id: position.market_id.clone(),
                side: position.side,
                entry_price: position.entry_price,
                exit_price: quote.price,
                shares: position.shares,
                pnl_usd,
                opened_at: position.opened_at,
                closed_at: now,
            });
            false
        });

        settled
    }
}

impl ExecutionSink for PaperExecutionSink {
    fn submit<'a>(&'a self, payload: &'a OrderPayload) -> BoxFuture<'a, AppResult<()>> {
        Box::pin(async move {
            let count = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
            let meta = &payload.metadata;
            info!(
                market_id = %meta.market_id,
                side = %meta.side,
                price = %meta.price,
                size_usd = %meta.size_usd,
                nonce = %payload.order.nonce,
                count,
                "Paper order"
            );

            if let Some(shares) = meta.size_usd.shares_at(meta.price) {
                self.open.lock().push(PaperPosition {
                    market_id: meta.market_id.clone(),
                    side: meta.side,
                    entry_price: meta.price,
                    shares,
                    opened_at: meta.filled_at,
                });
            }

            let mut recent = self.recent.lock();
            if recent.len() == RECENT_CAPACITY {
                recent.pop_front();
            }
            recent.push_back(payload.clone());
            Ok(())
        })
    }

    fn settle<'a>(
        &'a self,
        quotes: &'a QuoteBook,
        now: DateTime<Utc>,
        max_quote_age_ms: i64,
    ) -> BoxFuture<'a, AppResult<Vec<SettledTrade>>> {
        Box::pin(async move { Ok(self.close_due(quotes, now, max_quote_age_ms)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagarb_core::{Size, TokenId};
    use lagarb_executor::{OrderTemplateCache, TemplateConfig};
    use rust_decimal_macros::dec;

    fn payload(price: Decimal, size: Decimal, at: DateTime<Utc>) -> OrderPayload {
        let cache = OrderTemplateCache::new(TemplateConfig::default());
        let (template, _) = cache.upsert(
            MarketId::new("0xm"),
            TokenId::new("7"),
            MarketSide::Yes,
            "0xabc",
        );
        cache
            .fill_at(&template, Price::new(price), Size::new(size), at)
            .unwrap()
    }

    #[tokio::test]
    async fn test_settles_after_hold_at_quote() {
        let sink = PaperExecutionSink::with_config(PaperConfig { hold_secs: 60 });
        let opened = Utc::now();
        sink.submit(&payload(dec!(0.40), dec!(20), opened))
            .await
            .unwrap();
        assert_eq!(sink.open_positions(), 1);

        let quotes = QuoteBook::new();
        let later = opened + Duration::seconds(30);
        quotes
            .update_at(MarketId::new("0xm"), MarketSide::Yes, Price::new(dec!(0.30)), later)
            .unwrap();
        assert!(sink.settle(&quotes, later, 60_000).await.unwrap().is_empty());

        let due = opened + Duration::seconds(60);
        let settled = sink.settle(&quotes, due, 60_000).await.unwrap();
        assert_eq!(settled.len(), 1);
        // 50 shares bought at 0.40, marked at 0.30.
        assert_eq!(settled[0].shares, dec!(50));
        assert_eq!(settled[0].pnl_usd, dec!(-5));
        assert_eq!(settled[0].closed_at, due);
        assert_eq!(sink.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_stale_quote_keeps_position_open() {
        let sink = PaperExecutionSink::with_config(PaperConfig { hold_secs: 0 });
        let opened = Utc::now();
        sink.submit(&payload(dec!(0.50), dec!(10), opened))
            .await
            .unwrap();

        let quotes = QuoteBook::new();
        quotes
            .update_at(
                MarketId::new("0xm"),
                MarketSide::Yes,
                Price::new(dec!(0.60)),
                opened - Duration::minutes(10),
            )
            .unwrap();
        assert!(sink.settle(&quotes, opened, 60_000).await.unwrap().is_empty());
        assert_eq!(sink.open_positions(), 1);
    }
}
