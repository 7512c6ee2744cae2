//! Rolling price windows per symbol.
//!
//! The live feed pushes samples into a bounded, arrival-ordered window. The
//! reference poller overwrites a single last-known value. Consumers read
//! copies; no lock is held beyond a single map lookup.

use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use lagarb_core::{Price, PriceSample, PriceSource, Symbol};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Ingestor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestorConfig {
    /// Live samples retained per symbol.
    #[serde(default = "default_window_capacity")]
    pub window_capacity: usize,
    /// A reference older than this is stale.
    #[serde(default = "default_staleness_ms")]
    pub staleness_ms: i64,
}

fn default_window_capacity() -> usize {
    600
}

fn default_staleness_ms() -> i64 {
    2000
}

impl Default for IngestorConfig {
    fn default() -> Self {
        Self {
            window_capacity: default_window_capacity(),
            staleness_ms: default_staleness_ms(),
        }
    }
}

impl IngestorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.window_capacity < 2 {
            return Err("window_capacity must be at least 2".to_string());
        }
        if self.staleness_ms <= 0 {
            return Err("staleness_ms must be positive".to_string());
        }
        Ok(())
    }
}

/// Live feed connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedState {
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
}

impl FeedState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Disconnected => "disconnected",
        }
    }
}

/// Observable live feed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedStatus {
    pub state: FeedState,
    pub last_message_at: Option<DateTime<Utc>>,
    pub reconnect_count: u32,
    pub last_error: Option<String>,
}

impl Default for FeedStatus {
    fn default() -> Self {
        Self {
            state: FeedState::Disconnected,
            last_message_at: None,
            reconnect_count: 0,
            last_error: None,
        }
    }
}

/// Most recent live sample paired with a fresh reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricePair {
    pub symbol: Symbol,
    pub live: PriceSample,
    pub reference: PriceSample,
    /// Reference age at the time the pair was read.
    pub reference_age_ms: i64,
}

/// Last known reference value with its staleness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceState {
    pub sample: PriceSample,
    pub age_ms: i64,
    pub stale: bool,
}

#[derive(Debug)]
struct SymbolEntry {
    window: VecDeque<PriceSample>,
    live_recv_mono: Option<Instant>,
    reference: Option<PriceSample>,
    reference_recv_mono: Option<Instant>,
}

impl SymbolEntry {
    fn new(capacity: usize) -> Self {
        Self {
            window: VecDeque::with_capacity(capacity),
            live_recv_mono: None,
            reference: None,
            reference_recv_mono: None,
        }
    }
}

type Entry = Arc<RwLock<SymbolEntry>>;

/// Owner of the per-symbol live windows and reference values.
pub struct StreamIngestor {
    config: IngestorConfig,
    symbols: DashMap<Symbol, Entry>,
    feed_status: RwLock<FeedStatus>,
}

impl StreamIngestor {
    pub fn new(config: IngestorConfig) -> Self {
        Self {
            config,
            symbols: DashMap::new(),
            feed_status: RwLock::new(FeedStatus::default()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &IngestorConfig {
        &self.config
    }

    fn get_or_create(&self, symbol: &Symbol) -> Entry {
        self.symbols
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(RwLock::new(SymbolEntry::new(self.config.window_capacity))))
            .clone()
    }

    fn get(&self, symbol: &Symbol) -> Option<Entry> {
        self.symbols.get(symbol).map(|e| e.value().clone())
    }

    /// Append a live sample, evicting the oldest beyond window capacity.
    pub fn record_live(
        &self,
        symbol: &Symbol,
        price: Price,
        timestamp: DateTime<Utc>,
    ) -> FeedResult<()> {
        if !price.is_positive() {
            return Err(FeedError::InvalidData(format!(
                "non-positive live price {price} for {symbol}"
            )));
        }

        let entry = self.get_or_create(symbol);
        let mut guard = entry.write();
        if let Some(newest) = guard.window.back() {
            if timestamp < newest.observed_at {
                debug!(
                    %symbol,
                    ts = %timestamp,
                    newest = %newest.observed_at,
                    "Out-of-order live sample"
                );
            }
        }
        guard.window.push_back(PriceSample::new(
            symbol.clone(),
            PriceSource::Live,
            price,
            timestamp,
        ));
        while guard.window.len() > self.config.window_capacity {
            guard.window.pop_front();
        }
        guard.live_recv_mono = Some(Instant::now());
        Ok(())
    }

    /// Overwrite the last known reference value.
    pub fn record_reference(
        &self,
        symbol: &Symbol,
        price: Price,
        timestamp: DateTime<Utc>,
    ) -> FeedResult<()> {
        if !price.is_positive() {
            return Err(FeedError::InvalidData(format!(
                "non-positive reference price {price} for {symbol}"
            )));
        }

        let entry = self.get_or_create(symbol);
        let mut guard = entry.write();
        guard.reference = Some(PriceSample::new(
            symbol.clone(),
            PriceSource::Reference,
            price,
            timestamp,
        ));
        guard.reference_recv_mono = Some(Instant::now());
        Ok(())
    }

    /// Latest (live, reference) pair, or `None` when either side is missing or
    /// the reference is outside the staleness budget.
    pub fn latest(&self, symbol: &Symbol) -> Option<PricePair> {
        self.latest_at(symbol, Utc::now())
    }

    pub fn latest_at(&self, symbol: &Symbol, now: DateTime<Utc>) -> Option<PricePair> {
        let entry = self.get(symbol)?;
        let guard = entry.read();
        let live = guard.window.back()?.clone();
        let reference = guard.reference.as_ref()?;
        let age_ms = reference.age_ms_at(now);
        if age_ms > self.config.staleness_ms {
            return None;
        }
        Some(PricePair {
            symbol: symbol.clone(),
            live,
            reference: reference.clone(),
            reference_age_ms: age_ms,
        })
    }

    /// Last reference value, served even when stale.
    pub fn reference(&self, symbol: &Symbol) -> Option<ReferenceState> {
        self.reference_at(symbol, Utc::now())
    }

    pub fn reference_at(&self, symbol: &Symbol, now: DateTime<Utc>) -> Option<ReferenceState> {
        let entry = self.get(symbol)?;
        let guard = entry.read();
        let sample = guard.reference.clone()?;
        let age_ms = sample.age_ms_at(now);
        Some(ReferenceState {
            sample,
            age_ms,
            stale: age_ms > self.config.staleness_ms,
        })
    }

    /// Copy of the live window, oldest first.
    pub fn window(&self, symbol: &Symbol) -> Vec<PriceSample> {
        self.get(symbol)
            .map(|entry| entry.read().window.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Milliseconds since the last live sample arrived (monotonic).
    pub fn live_age_ms(&self, symbol: &Symbol) -> Option<i64> {
        self.get(symbol)
            .and_then(|entry| entry.read().live_recv_mono)
            .map(|t| t.elapsed().as_millis() as i64)
    }

    /// Milliseconds since the last reference value arrived (monotonic).
    pub fn reference_age_ms(&self, symbol: &Symbol) -> Option<i64> {
        self.get(symbol)
            .and_then(|entry| entry.read().reference_recv_mono)
            .map(|t| t.elapsed().as_millis() as i64)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        let mut out: Vec<Symbol> = self.symbols.iter().map(|e| e.key().clone()).collect();
        out.sort();
        out
    }

    // Feed connection state

    pub fn set_feed_state(&self, state: FeedState) {
        let mut status = self.feed_status.write();
        if status.state != state {
            info!(from = status.state.as_str(), to = state.as_str(), "Feed state changed");
            status.state = state;
        }
    }

    pub fn record_feed_message(&self) {
        self.feed_status.write().last_message_at = Some(Utc::now());
    }

    pub fn record_reconnect(&self, reason: &str) {
        let mut status = self.feed_status.write();
        status.reconnect_count = status.reconnect_count.saturating_add(1);
        status.last_error = Some(reason.to_string());
    }

    #[must_use]
    pub fn feed_status(&self) -> FeedStatus {
        self.feed_status.read().clone()
    }
}
