//! Pre-built order templates keyed by (market, side).
//!
//! Templates hold everything about an order except price and size, so the
//! hot path only fills two numbers. The cache is bounded by distinct
//! markets; overflow evicts the least recently used ~20% of entries in one
//! batch. A single lock covers lookup, fill and eviction, so a fill either
//! sees a resident template or fails with `TemplateEvicted`.

use crate::error::TemplateError;
use crate::nonce::{Clock, NonceManager, SystemClock};
use crate::payload::OrderPayload;
use chrono::{DateTime, Utc};
use lagarb_core::{MarketId, MarketSide, Price, Size, TokenId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateConfig {
    /// Maximum distinct markets held.
    #[serde(default = "default_max_markets")]
    pub max_markets: usize,
    /// Share of entries dropped per eviction pass.
    #[serde(default = "default_eviction_fraction")]
    pub eviction_fraction: f64,
    #[serde(default)]
    pub fee_rate_bps: u32,
    #[serde(default)]
    pub signature_type: u8,
}

fn default_max_markets() -> usize {
    100
}

fn default_eviction_fraction() -> f64 {
    0.2
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            max_markets: default_max_markets(),
            eviction_fraction: default_eviction_fraction(),
            fee_rate_bps: 0,
            signature_type: 0,
        }
    }
}

impl TemplateConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_markets == 0 {
            return Err("max_markets must be at least 1".to_string());
        }
        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err("eviction_fraction must be in (0, 1]".to_string());
        }
        Ok(())
    }
}

/// Order skeleton for one (market, side).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTemplate {
    pub market_id: MarketId,
    pub token_id: TokenId,
    pub side: MarketSide,
    /// Signer identity placed in the `maker` field.
    pub maker: String,
    pub nonce: u64,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub use_count: u64,
}

impl OrderTemplate {
    fn recency(&self) -> DateTime<Utc> {
        self.last_used_at.unwrap_or(self.created_at)
    }
}

type MarketTemplates = HashMap<MarketSide, OrderTemplate>;

pub struct OrderTemplateCache<C: Clock = SystemClock> {
    config: TemplateConfig,
    nonces: NonceManager<C>,
    markets: Mutex<HashMap<MarketId, MarketTemplates>>,
}

impl OrderTemplateCache<SystemClock> {
    pub fn new(config: TemplateConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> OrderTemplateCache<C> {
    pub fn with_clock(config: TemplateConfig, clock: C) -> Self {
        Self {
            config,
            nonces: NonceManager::new(clock),
            markets: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &TemplateConfig {
        &self.config
    }

    /// Create or refresh the template for (market, side). A refresh issues a
    /// new nonce, so copies of the old template can no longer be filled.
    /// Returns the number of entries evicted to stay within bounds.
    pub fn upsert(
        &self,
        market_id: MarketId,
        token_id: TokenId,
        side: MarketSide,
        maker: impl Into<String>,
    ) -> (OrderTemplate, usize) {
        self.upsert_at(market_id, token_id, side, maker, Utc::now())
    }

    pub fn upsert_at(
        &self,
        market_id: MarketId,
        token_id: TokenId,
        side: MarketSide,
        maker: impl Into<String>,
        now: DateTime<Utc>,
    ) -> (OrderTemplate, usize) {
        let template = OrderTemplate {
            market_id: market_id.clone(),
            token_id,
            side,
            maker: maker.into(),
            nonce: self.nonces.next(),
            created_at: now,
            last_used_at: None,
            use_count: 0,
        };

        let mut markets = self.markets.lock();
        markets
            .entry(market_id)
            .or_default()
            .insert(side, template.clone());
        let evicted = self.evict_locked(&mut markets);
        drop(markets);

        debug!(
            market_id = %template.market_id,
            side = %side,
            nonce = template.nonce,
            "Template upserted"
        );
        (template, evicted)
    }

    /// Snapshot of the resident template.
    #[must_use]
    pub fn get(&self, market_id: &MarketId, side: MarketSide) -> Option<OrderTemplate> {
        self.markets
            .lock()
            .get(market_id)
            .and_then(|m| m.get(&side))
            .cloned()
    }

    /// Fill price and size into a template.
    ///
    /// Fails with `TemplateEvicted` if the template is no longer resident or
    /// was refreshed since `template` was read.
    pub fn fill(
        &self,
        template: &OrderTemplate,
        price: Price,
        size: Size,
    ) -> Result<OrderPayload, TemplateError> {
        self.fill_at(template, price, size, Utc::now())
    }

    pub fn fill_at(
        &self,
        template: &OrderTemplate,
        price: Price,
        size: Size,
        now: DateTime<Utc>,
    ) -> Result<OrderPayload, TemplateError> {
        if !price.is_probability() {
            return Err(TemplateError::InvalidPrice(format!(
                "{price} is outside (0, 1)"
            )));
        }
        if !size.is_positive() {
            return Err(TemplateError::InvalidSize(format!("{size} must be positive")));
        }

        let mut markets = self.markets.lock();
        let resident = markets
            .get_mut(&template.market_id)
            .and_then(|m| m.get_mut(&template.side))
            .filter(|t| t.nonce == template.nonce)
            .ok_or_else(|| TemplateError::TemplateEvicted {
                market_id: template.market_id.clone(),
                side: template.side,
                nonce: template.nonce,
            })?;

        let payload = OrderPayload::build(
            resident,
            price,
            size,
            self.config.fee_rate_bps,
            self.config.signature_type,
            now,
        )?;
        resident.use_count += 1;
        resident.last_used_at = Some(now);
        Ok(payload)
    }

    /// Distinct markets held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.lock().is_empty()
    }

    /// Templates held across all markets.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.markets.lock().values().map(HashMap::len).sum()
    }

    pub fn remove_market(&self, market_id: &MarketId) -> bool {
        self.markets.lock().remove(market_id).is_some()
    }

    pub fn clear(&self) {
        self.markets.lock().clear();
    }

    fn evict_locked(&self, markets: &mut HashMap<MarketId, MarketTemplates>) -> usize {
        let mut evicted = 0;

        while markets.len() > self.config.max_markets {
            let mut entries: Vec<(DateTime<Utc>, MarketId, MarketSide)> = markets
                .iter()
                .flat_map(|(id, sides)| {
                    sides
                        .values()
                        .map(move |t| (t.recency(), id.clone(), t.side))
                })
                .collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

            let batch = ((entries.len() as f64 * self.config.eviction_fraction).floor() as usize)
                .max(1);
            for (_, id, side) in entries.into_iter().take(batch) {
                if let Some(sides) = markets.get_mut(&id) {
                    sides.remove(&side);
                    if sides.is_empty() {
                        markets.remove(&id);
                    }
                }
                evicted += 1;
            }
        }

        if evicted > 0 {
            info!(
                evicted,
                markets = markets.len(),
                max_markets = self.config.max_markets,
                "Evicted least recently used templates"
            );
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct StepClock(AtomicU64);

    impl Clock for StepClock {
        fn now_ms(&self) -> u64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn cache(max_markets: usize) -> OrderTemplateCache<StepClock> {
        OrderTemplateCache::with_clock(
            TemplateConfig {
                max_markets,
                ..TemplateConfig::default()
            },
            StepClock(AtomicU64::new(1_000)),
        )
    }

    fn market(i: usize) -> MarketId {
        MarketId::new(format!("m{i:03}"))
    }

    fn token(i: usize) -> TokenId {
        TokenId::new(format!("t{i:03}"))
    }

    #[test]
    fn test_fill_reference_amounts() {
        let cache = cache(10);
        let (template, _) = cache.upsert(market(1), token(1), MarketSide::Yes, "0xabc");

        let payload = cache
            .fill(&template, Price::new(dec!(0.50)), Size::new(dec!(100)))
            .unwrap();

        assert_eq!(payload.order.maker_amount, "100000000");
        assert_eq!(payload.order.taker_amount, "200000000");
        assert_eq!(payload.order.side, "BUY");
        assert_eq!(payload.order.token_id, "t001");
        assert_eq!(payload.order.nonce, template.nonce.to_string());
        assert_eq!(payload.metadata.market_id, market(1));

        let json = payload.to_json();
        assert_eq!(json["order"]["tokenID"], "t001");
        assert_eq!(json["order"]["makerAmount"], "100000000");
        assert_eq!(json["order"]["expiration"], "0");
    }

    #[test]
    fn test_fill_rejects_bad_inputs() {
        let cache = cache(10);
        let (template, _) = cache.upsert(market(1), token(1), MarketSide::Yes, "0xabc");

        for price in [dec!(0), dec!(1), dec!(1.2), dec!(-0.1)] {
            assert!(matches!(
                cache.fill(&template, Price::new(price), Size::new(dec!(10))),
                Err(TemplateError::InvalidPrice(_))
            ));
        }
        assert!(matches!(
            cache.fill(&template, Price::new(dec!(0.4)), Size::new(dec!(0))),
            Err(TemplateError::InvalidSize(_))
        ));
        assert_eq!(cache.get(&market(1), MarketSide::Yes).unwrap().use_count, 0);
    }

    #[test]
    fn test_fill_updates_usage() {
        let cache = cache(10);
        let (template, _) = cache.upsert(market(1), token(1), MarketSide::No, "0xabc");
        let t0 = Utc::now();
        cache
            .fill_at(&template, Price::new(dec!(0.3)), Size::new(dec!(5)), t0)
            .unwrap();
        cache
            .fill_at(&template, Price::new(dec!(0.3)), Size::new(dec!(5)), t0)
            .unwrap();

        let resident = cache.get(&market(1), MarketSide::No).unwrap();
        assert_eq!(resident.use_count, 2);
        assert_eq!(resident.last_used_at, Some(t0));
        assert_eq!(resident.market_id, template.market_id);
        assert_eq!(resident.token_id, template.token_id);
        assert_eq!(resident.side, template.side);
        assert_eq!(resident.maker, template.maker);
        assert_eq!(resident.nonce, template.nonce);
        assert_eq!(resident.created_at, template.created_at);
    }

    #[test]
    fn test_refresh_invalidates_old_copy() {
        let cache = cache(10);
        let (old, _) = cache.upsert(market(1), token(1), MarketSide::Yes, "0xabc");
        let (new, _) = cache.upsert(market(1), token(1), MarketSide::Yes, "0xabc");
        assert!(new.nonce > old.nonce);

        assert!(matches!(
            cache.fill(&old, Price::new(dec!(0.5)), Size::new(dec!(1))),
            Err(TemplateError::TemplateEvicted { .. })
        ));
        assert!(cache
            .fill(&new, Price::new(dec!(0.5)), Size::new(dec!(1)))
            .is_ok());
    }

    #[test]
    fn test_fill_after_removal_fails() {
        let cache = cache(10);
        let (template, _) = cache.upsert(market(1), token(1), MarketSide::Yes, "0xabc");
        assert!(cache.remove_market(&market(1)));
        assert!(matches!(
            cache.fill(&template, Price::new(dec!(0.5)), Size::new(dec!(1))),
            Err(TemplateError::TemplateEvicted { .. })
        ));
    }

    #[test]
    fn test_lru_batch_eviction() {
        let cache = cache(10);
        let base = Utc::now();

        for i in 0..10 {
            cache.upsert_at(
                market(i),
                token(i),
                MarketSide::Yes,
                "0xabc",
                base + Duration::seconds(i as i64),
            );
        }
        assert_eq!(cache.len(), 10);

        // Touch the two oldest so they become the most recent.
        for i in 0..2 {
            let t = cache.get(&market(i), MarketSide::Yes).unwrap();
            cache
                .fill_at(
                    &t,
                    Price::new(dec!(0.5)),
                    Size::new(dec!(1)),
                    base + Duration::seconds(100),
                )
                .unwrap();
        }

        let (_, evicted) = cache.upsert_at(
            market(10),
            token(10),
            MarketSide::Yes,
            "0xabc",
            base + Duration::seconds(50),
        );

        // 11 entries, floor(11 * 0.2) = 2 evicted: m002 and m003.
        assert_eq!(evicted, 2);
        assert_eq!(cache.len(), 9);
        assert!(cache.get(&market(0), MarketSide::Yes).is_some());
        assert!(cache.get(&market(1), MarketSide::Yes).is_some());
        assert!(cache.get(&market(2), MarketSide::Yes).is_none());
        assert!(cache.get(&market(3), MarketSide::Yes).is_none());
        assert!(cache.get(&market(10), MarketSide::Yes).is_some());
    }

    #[test]
    fn test_eviction_removes_at_least_one() {
        let cache = cache(1);
        let base = Utc::now();
        cache.upsert_at(market(0), token(0), MarketSide::Yes, "0x", base);
        let (_, evicted) = cache.upsert_at(
            market(1),
            token(1),
            MarketSide::Yes,
            "0x",
            base + Duration::seconds(1),
        );
        assert_eq!(evicted, 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&market(1), MarketSide::Yes).is_some());
    }

    #[test]
    fn test_entry_count_and_clear() {
        let cache = cache(10);
        cache.upsert(market(1), token(1), MarketSide::Yes, "0x");
        cache.upsert(market(1), token(2), MarketSide::No, "0x");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entry_count(), 2);
        cache.clear();
        assert!(cache.is_empty());
    }
}
