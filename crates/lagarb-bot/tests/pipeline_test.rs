//! End-to-end cycle tests without network access.
//!
//! Prices are written straight into the ingestor, so every stage after
//! ingestion runs for real:
//! - detection and confluence
//! - risk gating and decision publishing
//! - queueing, template fill and paper dispatch
//! - paper settlement feeding the drawdown check
//! - event log output

use chrono::{DateTime, Duration, Utc};
use lagarb_bot::{
    AppConfig, AppError, Application, KeyValueStore, PaperExecutionSink, SharedKvStore,
    SharedState, TradingCycle, WatchlistEntry,
};
use lagarb_core::{MarketId, MarketSide, Price, Symbol};
use lagarb_feed::StreamIngestor;
use lagarb_risk::CheckName;
use rust_decimal_macros::dec;
use std::io::{BufRead, BufReader};
use std::sync::Arc;
use tempfile::TempDir;

fn config(dir: &TempDir) -> AppConfig {
    let mut config = AppConfig::default();
    config.persistence.data_dir = dir.path().to_string_lossy().into_owned();
    config.watchlist.push(WatchlistEntry {
        symbol: "BTCUSDT".to_string(),
        market_id: "0xbtc-up".to_string(),
        yes_token_id: "101".to_string(),
        no_token_id: "102".to_string(),
        resolves_at: Utc::now() + Duration::hours(6),
        volume_24h: 500_000.0,
        yes_price: Some(dec!(0.40)),
        no_price: Some(dec!(0.60)),
    });
    config
}

struct Harness {
    cycle: TradingCycle,
    shared: SharedState,
    sink: Arc<PaperExecutionSink>,
    store: Arc<SharedKvStore>,
}

fn harness(config: &AppConfig) -> Harness {
    let shared = SharedState::new(config);
    let sink = Arc::new(PaperExecutionSink::with_config(config.paper.clone()));
    let store = Arc::new(SharedKvStore::new());
    let cycle = TradingCycle::new(config, shared.clone(), sink.clone(), store.clone()).unwrap();
    Harness {
        cycle,
        shared,
        sink,
        store,
    }
}

/// Quiet live market 4 bps wide, sitting about 21 bps above the reference.
/// Only the oracle-lag scenario fires on this shape.
fn seed_lagging_reference(ingestor: &StreamIngestor, symbol: &Symbol, now: DateTime<Utc>) {
    for i in 0..30i64 {
        let price = if i % 2 == 0 { dec!(50000) } else { dec!(50004) };
        ingestor
            .record_live(symbol, Price::new(price), now - Duration::milliseconds(300 - i * 10))
            .unwrap();
    }
    ingestor
        .record_reference(symbol, Price::new(dec!(49900)), now)
        .unwrap();
}

fn event_lines(dir: &TempDir) -> Vec<serde_json::Value> {
    let mut lines = Vec::new();
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let file = std::fs::File::open(entry.unwrap().path()).unwrap();
        for line in BufReader::new(file).lines() {
            lines.push(serde_json::from_str(&line.unwrap()).unwrap());
        }
    }
    lines
}

#[tokio::test]
async fn test_decision_flows_to_paper_sink() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(&config(&dir));
    let symbol = Symbol::new("BTCUSDT").unwrap();
    let now = Utc::now();
    seed_lagging_reference(&h.shared.ingestor, &symbol, now);

    let summary = h.cycle.run_cycle_at(now).await.unwrap();
    assert_eq!(summary.snapshots, 1);
    assert_eq!(summary.decisions, 1);
    assert_eq!(summary.published, 1);
    assert_eq!(summary.enqueued, 1);
    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.blocked_symbols, 0);

    let published = h.store.get("lagarb:edge:BTCUSDT").unwrap();
    let decision: serde_json::Value = serde_json::from_str(&published).unwrap();
    assert_eq!(decision["trigger_type"], "oracle_lag");
    assert_eq!(decision["symbol"], "BTCUSDT");

    // Up divergence buys YES at the 0.40 quote, capped at max_trade_usd.
    let orders = h.sink.recent();
    assert_eq!(orders.len(), 1);
    let order = &orders[0];
    assert_eq!(order.order.token_id, "101");
    assert_eq!(order.order.side, "BUY");
    assert_eq!(order.order.maker_amount, "50000000");
    assert_eq!(order.order.taker_amount, "125000000");
    assert_eq!(order.metadata.price.inner(), dec!(0.40));
    assert!(h.shared.queue.is_empty());

    h.cycle.close().unwrap();
    let events = event_lines(&dir);
    let kinds: Vec<&str> = events
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"divergence_snapshot"));
    assert!(kinds.contains(&"risk_gate_result"));
    assert!(kinds.contains(&"edge_decision"));
}

#[tokio::test]
async fn test_kill_switch_withholds_decision() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(&config(&dir));
    let symbol = Symbol::new("BTCUSDT").unwrap();
    let now = Utc::now();
    seed_lagging_reference(&h.shared.ingestor, &symbol, now);
    h.shared.risk_gate.kill_switch().trigger("operator halt");

    let summary = h.cycle.run_cycle_at(now).await.unwrap();
    assert_eq!(summary.decisions, 1);
    assert_eq!(summary.published, 0);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(summary.blocked_symbols, 1);
    assert!(h.store.keys("lagarb:edge:").is_empty());
    assert_eq!(h.sink.submitted(), 0);

    let status = h.shared.status.collect_snapshot();
    assert_eq!(status.risk.map(|r| r.trading_allowed), Some(false));
    assert_eq!(status.divergences["BTCUSDT"].last_outcome, "decision");
}

#[tokio::test]
async fn test_stale_reference_yields_no_snapshot() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(&config(&dir));
    let symbol = Symbol::new("BTCUSDT").unwrap();
    let now = Utc::now();
    seed_lagging_reference(&h.shared.ingestor, &symbol, now - Duration::seconds(10));

    let summary = h.cycle.run_cycle_at(now).await.unwrap();
    assert_eq!(summary.snapshots, 0);
    assert_eq!(summary.decisions, 0);
    assert_eq!(h.sink.submitted(), 0);
}

#[tokio::test]
async fn test_application_stops_on_signal() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.status.enabled = false;
    config.reference.url = "http://127.0.0.1:9/reference".to_string();

    lagarb_feed::init_crypto();
    let app = Application::new(config).unwrap();
    let shared = app.shared().clone();
    app.run_until(tokio::time::sleep(std::time::Duration::from_millis(300)))
        .await
        .unwrap();

    // No reference ever arrived, so every cycle was gated on stale data.
    let status = shared.status.collect_snapshot();
    assert_eq!(status.risk.map(|r| r.trading_allowed), Some(false));
    assert!(!event_lines(&dir).is_empty());
}

#[tokio::test]
async fn test_paper_losses_trip_drawdown() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.paper.hold_secs = 0;
    config.risk.bankroll_usd = dec!(200);
    let mut h = harness(&config);
    let symbol = Symbol::new("BTCUSDT").unwrap();
    let now = Utc::now();
    seed_lagging_reference(&h.shared.ingestor, &symbol, now);

    let first = h.cycle.run_cycle_at(now).await.unwrap();
    assert_eq!(first.dispatched, 1);
    assert_eq!(first.settled, 0);
    assert_eq!(h.sink.open_positions(), 1);

    // YES collapses from 0.40 to 0.01: 125 shares lose 48.75, about 24% of 200.
    h.shared
        .quotes
        .update(MarketId::new("0xbtc-up"), MarketSide::Yes, Price::new(dec!(0.01)))
        .unwrap();

    let second = h.cycle.run_cycle_at(now).await.unwrap();
    assert_eq!(second.settled, 1);
    assert_eq!(h.sink.open_positions(), 0);
    assert_eq!(second.blocked_symbols, 1);
    assert_eq!(second.published, 0);
    assert_eq!(second.enqueued, 0);
    assert_eq!(second.dispatched, 0);
    assert_eq!(h.sink.submitted(), 1);

    let drawdown = h.shared.risk_gate.drawdown_pct_at(now);
    assert!((drawdown - 24.375).abs() < 1e-9);
    let risk = h.shared.status.collect_snapshot().risk.unwrap();
    assert!(!risk.trading_allowed);
    assert!(!risk.check(CheckName::Drawdown).unwrap().passed);
}

#[tokio::test]
async fn test_stale_quote_is_not_sized() {
    let dir = TempDir::new().unwrap();
    let mut h = harness(&config(&dir));
    let symbol = Symbol::new("BTCUSDT").unwrap();
    let now = Utc::now();
    seed_lagging_reference(&h.shared.ingestor, &symbol, now);
    h.shared
        .quotes
        .update_at(
            MarketId::new("0xbtc-up"),
            MarketSide::Yes,
            Price::new(dec!(0.40)),
            now - Duration::minutes(10),
        )
        .unwrap();

    let summary = h.cycle.run_cycle_at(now).await.unwrap();
    assert_eq!(summary.published, 1);
    assert_eq!(summary.enqueued, 0);
    assert_eq!(summary.dispatched, 0);
    assert_eq!(h.sink.submitted(), 0);
}

#[tokio::test]
async fn test_startup_error_leaves_nothing_running() {
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"file").unwrap();

    let mut config = config(&dir);
    config.status.enabled = false;
    config.reference.url = "http://127.0.0.1:9/reference".to_string();
    config.persistence.data_dir = blocker.join("events").to_string_lossy().into_owned();

    lagarb_feed::init_crypto();
    let app = Application::new(config).unwrap();
    let shared = app.shared().clone();
    let token = app.shutdown_token();

    let result = app
        .run_until(tokio::time::sleep(std::time::Duration::from_secs(30)))
        .await;
    assert!(matches!(result, Err(AppError::Persistence(_))));
    assert!(token.is_cancelled());

    // No cycle ever ran and no poller touched the ingestor.
    assert!(shared.status.collect_snapshot().risk.is_none());
    assert!(shared
        .ingestor
        .reference(&Symbol::new("BTCUSDT").unwrap())
        .is_none());
}
