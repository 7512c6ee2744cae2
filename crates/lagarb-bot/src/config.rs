//! Application configuration.
//!
//! Resolution order: `--config` path, then `LAGARB_CONFIG`, then
//! `config/default.toml`, then built-in defaults. `LAGARB_DATA_DIR`
//! overrides the event log directory in every case.

use crate::error::{AppError, AppResult};
use crate::kill_switch::KillSwitchConfig;
use crate::sink::PaperConfig;
use chrono::{DateTime, Utc};
use lagarb_core::{MarketId, MarketSide, Symbol, TokenId};
use lagarb_dashboard::StatusConfig;
use lagarb_detector::DetectorConfig;
use lagarb_executor::{ScorerConfig, SizingConfig, TemplateConfig};
use lagarb_feed::{IngestorConfig, LiveFeedConfig, QuoteConfig, ReferencePollerConfig};
use lagarb_risk::RiskGateConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const CONFIG_ENV: &str = "LAGARB_CONFIG";
pub const DATA_DIR_ENV: &str = "LAGARB_DATA_DIR";
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// One tracked symbol and the prediction market it drives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistEntry {
    pub symbol: String,
    pub market_id: String,
    pub yes_token_id: String,
    pub no_token_id: String,
    pub resolves_at: DateTime<Utc>,
    #[serde(default)]
    pub volume_24h: f64,
    /// Initial quotes until the execution side reports live ones.
    #[serde(default)]
    pub yes_price: Option<Decimal>,
    #[serde(default)]
    pub no_price: Option<Decimal>,
}

impl WatchlistEntry {
    pub fn symbol(&self) -> AppResult<Symbol> {
        Ok(Symbol::new(&self.symbol)?)
    }

    pub fn market_id(&self) -> MarketId {
        MarketId::new(self.market_id.clone())
    }

    pub fn token_id(&self, side: MarketSide) -> TokenId {
        match side {
            MarketSide::Yes => TokenId::new(self.yes_token_id.clone()),
            MarketSide::No => TokenId::new(self.no_token_id.clone()),
        }
    }

    pub fn hours_to_resolution(&self, now: DateTime<Utc>) -> f64 {
        (self.resolves_at - now).num_seconds() as f64 / 3600.0
    }
}

/// Identity placed in the `maker` field of every order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignerConfig {
    #[serde(default = "default_signer_address")]
    pub address: String,
}

fn default_signer_address() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

impl Default for SignerConfig {
    fn default() -> Self {
        Self {
            address: default_signer_address(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory for `events_YYYY-MM-DD.jsonl`.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Records buffered before a flush.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Unwritten records kept while the log cannot be written; older ones
    /// are dropped.
    #[serde(default = "default_max_pending")]
    pub max_pending: usize,
}

fn default_data_dir() -> String {
    "./data/events".to_string()
}

fn default_buffer_size() -> usize {
    100
}

fn default_max_pending() -> usize {
    10_000
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            buffer_size: default_buffer_size(),
            max_pending: default_max_pending(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Key prefix for published decisions.
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_cycle_interval_ms")]
    pub cycle_interval_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Candidates dispatched per cycle.
    #[serde(default = "default_dispatch_batch_size")]
    pub dispatch_batch_size: usize,
    #[serde(default)]
    pub watchlist: Vec<WatchlistEntry>,
    #[serde(default)]
    pub signer: SignerConfig,
    #[serde(default)]
    pub ingestor: IngestorConfig,
    #[serde(default)]
    pub live_feed: LiveFeedConfig,
    #[serde(default)]
    pub reference: ReferencePollerConfig,
    #[serde(default)]
    pub quotes: QuoteConfig,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub risk: RiskGateConfig,
    #[serde(default)]
    pub scorer: ScorerConfig,
    #[serde(default)]
    pub templates: TemplateConfig,
    #[serde(default)]
    pub sizing: SizingConfig,
    #[serde(default)]
    pub paper: PaperConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub kill_switch: KillSwitchConfig,
}

fn default_namespace() -> String {
    "lagarb".to_string()
}

fn default_cycle_interval_ms() -> u64 {
    250
}

fn default_queue_capacity() -> usize {
    50
}

fn default_dispatch_batch_size() -> usize {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            cycle_interval_ms: default_cycle_interval_ms(),
            queue_capacity: default_queue_capacity(),
            dispatch_batch_size: default_dispatch_batch_size(),
            watchlist: Vec::new(),
            signer: SignerConfig::default(),
            ingestor: IngestorConfig::default(),
            live_feed: LiveFeedConfig::default(),
            reference: ReferencePollerConfig::default(),
            quotes: QuoteConfig::default(),
            detector: DetectorConfig::default(),
            risk: RiskGateConfig::default(),
            scorer: ScorerConfig::default(),
            templates: TemplateConfig::default(),
            sizing: SizingConfig::default(),
            paper: PaperConfig::default(),
            persistence: PersistenceConfig::default(),
            status: StatusConfig::default(),
            kill_switch: KillSwitchConfig::default(),
        }
    }
}

impl AppConfig {
    /// Resolve, load, apply env overrides and validate.
    pub fn load(cli_path: Option<&str>) -> AppResult<Self> {
        let explicit = cli_path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok());

        let mut config = match explicit {
            Some(path) => Self::from_file(&path)?,
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::from_file(DEFAULT_CONFIG_PATH)?
            }
            None => {
                tracing::warn!(path = DEFAULT_CONFIG_PATH, "Config file not found, using defaults");
                Self::default()
            }
        };

        if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
            config.apply_data_dir_override(dir);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from a specific file without env overrides or validation.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config {path}: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> AppResult<Self> {
        toml::from_str(content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    pub fn apply_data_dir_override(&mut self, dir: impl Into<String>) {
        let dir = dir.into();
        if !dir.is_empty() {
            self.persistence.data_dir = dir;
        }
    }

    pub fn validate(&self) -> AppResult<()> {
        let check = |r: Result<(), String>| r.map_err(AppError::Config);

        if self.namespace.is_empty() {
            return Err(AppError::Config("namespace is empty".to_string()));
        }
        if self.cycle_interval_ms == 0 {
            return Err(AppError::Config("cycle_interval_ms must be positive".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(AppError::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.dispatch_batch_size == 0 {
            return Err(AppError::Config(
                "dispatch_batch_size must be at least 1".to_string(),
            ));
        }

        check(self.ingestor.validate())?;
        check(self.live_feed.validate())?;
        check(self.reference.validate())?;
        check(self.quotes.validate())?;
        check(self.detector.validate())?;
        check(self.risk.validate())?;
        check(self.scorer.validate())?;
        check(self.templates.validate())?;
        check(self.sizing.validate())?;
        check(self.paper.validate())?;
        if self.persistence.max_pending < self.persistence.buffer_size {
            return Err(AppError::Config(
                "persistence max_pending must be at least buffer_size".to_string(),
            ));
        }
        check(self.status.validate())?;
        check(self.kill_switch.validate())?;

        let mut seen = HashSet::new();
        for entry in &self.watchlist {
            let symbol = entry.symbol()?;
            if !seen.insert(symbol.clone()) {
                return Err(AppError::Config(format!("duplicate watchlist symbol {symbol}")));
            }
            for price in [entry.yes_price, entry.no_price].into_iter().flatten() {
                if price <= Decimal::ZERO || price >= Decimal::ONE {
                    return Err(AppError::Config(format!(
                        "{symbol}: seed price {price} outside (0, 1)"
                    )));
                }
            }
        }
        for symbol in self.live_feed.streams.keys() {
            if !seen.contains(&Symbol::new(symbol)?) {
                return Err(AppError::Config(format!(
                    "live feed stream for {symbol} has no watchlist entry"
                )));
            }
        }

        if self.watchlist.len() > self.templates.max_markets {
            return Err(AppError::Config(format!(
                "watchlist has {} markets but template cache holds {}",
                self.watchlist.len(),
                self.templates.max_markets
            )));
        }
        if self.reference.interval_ms as i64 >= self.risk.max_feed_staleness_ms {
            return Err(AppError::Config(
                "reference interval_ms must be below risk max_feed_staleness_ms".to_string(),
            ));
        }
        if self.sizing.max_trade_usd > self.risk.bankroll_usd {
            return Err(AppError::Config(
                "sizing max_trade_usd exceeds risk bankroll_usd".to_string(),
            ));
        }
        Ok(())
    }

    pub fn watch_entry(&self, symbol: &Symbol) -> Option<&WatchlistEntry> {
        self.watchlist
            .iter()
            .find(|e| e.symbol().is_ok_and(|s| &s == symbol))
    }

    pub fn symbols(&self) -> AppResult<Vec<Symbol>> {
        self.watchlist.iter().map(WatchlistEntry::symbol).collect()
    }
}
