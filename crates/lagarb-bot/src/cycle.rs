//! One detection/dispatch cycle over the watchlist.
//!
//! Each cycle first settles due positions into the risk gate's trade log.
//! Then per symbol: detect, gate, persist, and on an allowed decision publish
//! it and enqueue a sized candidate. After every symbol has been evaluated
//! the best candidates are filled from their templates and handed to the
//! sink.

use crate::config::{AppConfig, WatchlistEntry};
use crate::error::AppResult;
use crate::kv::{DecisionPublisher, KeyValueStore};
use crate::sink::ExecutionSink;
use chrono::{DateTime, Utc};
use lagarb_core::{MarketId, MarketSide, Price, Symbol, TokenId};
use lagarb_dashboard::StatusState;
use lagarb_detector::{EdgeDecision, TriggerEngine};
use lagarb_executor::{
    CandidateDraft, EnqueueOutcome, KellySizer, OrderPayload, OrderTemplate, OrderTemplateCache,
    PriorityScorer, TemplateError, TradeCandidate, TradePriorityQueue,
};
use lagarb_feed::{QuoteBook, StreamIngestor};
use lagarb_persistence::{EventLogWriter, EventRecord};
use lagarb_risk::{CheckName, RiskGate, RiskGateResult, RiskInputs};
use lagarb_telemetry::Metrics;
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Components shared between the cycle, the feed tasks and the status server.
#[derive(Clone)]
pub struct SharedState {
    pub ingestor: Arc<StreamIngestor>,
    pub risk_gate: Arc<RiskGate>,
    pub queue: Arc<TradePriorityQueue>,
    pub templates: Arc<OrderTemplateCache>,
    pub quotes: Arc<QuoteBook>,
    pub status: StatusState,
}

impl SharedState {
    pub fn new(config: &AppConfig) -> Self {
        let ingestor = Arc::new(StreamIngestor::new(config.ingestor.clone()));
        let queue = Arc::new(TradePriorityQueue::new(
            PriorityScorer::new(config.scorer.clone()),
            config.queue_capacity,
        ));
        let templates = Arc::new(OrderTemplateCache::new(config.templates.clone()));
        let status = StatusState::new(ingestor.clone(), queue.clone(), templates.clone());

        Self {
            ingestor,
            risk_gate: Arc::new(RiskGate::new(config.risk.clone())),
            queue,
            templates,
            quotes: Arc::new(QuoteBook::new()),
            status,
        }
    }
}

/// Counters for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub symbols: usize,
    pub snapshots: usize,
    pub decisions: usize,
    pub published: usize,
    pub enqueued: usize,
    pub dispatched: usize,
    pub settled: usize,
    pub blocked_symbols: usize,
}

pub struct TradingCycle {
    watchlist: Arc<[(Symbol, WatchlistEntry)]>,
    maker: String,
    dispatch_batch_size: usize,
    max_quote_age_ms: i64,
    engine: TriggerEngine,
    sizer: KellySizer,
    shared: SharedState,
    publisher: DecisionPublisher,
    sink: Arc<dyn ExecutionSink>,
    writer: EventLogWriter,
    /// Dropped event count last reported to metrics.
    events_dropped: u64,
    /// Failed checks per symbol, for state-change logging.
    blocked: HashMap<Symbol, HashSet<CheckName>>,
}

impl TradingCycle {
    /// Build the cycle, open the event log, warm templates for both sides of
    /// every watched market and seed configured quotes.
    pub fn new(
        config: &AppConfig,
        shared: SharedState,
        sink: Arc<dyn ExecutionSink>,
        store: Arc<dyn KeyValueStore>,
    ) -> AppResult<Self> {
        let watchlist = config
            .watchlist
            .iter()
            .map(|entry| Ok((entry.symbol()?, entry.clone())))
            .collect::<AppResult<Vec<_>>>()?;

        let writer = EventLogWriter::with_max_pending(
            &config.persistence.data_dir,
            config.persistence.buffer_size,
            config.persistence.max_pending,
        )?;

        let cycle = Self {
            watchlist: watchlist.into(),
            maker: config.signer.address.clone(),
            dispatch_batch_size: config.dispatch_batch_size,
            max_quote_age_ms: config.quotes.max_age_ms,
            engine: TriggerEngine::new(config.detector.clone()),
            sizer: KellySizer::new(config.sizing.clone()),
            shared,
            publisher: DecisionPublisher::new(store, config.namespace.clone()),
            sink,
            writer,
            events_dropped: 0,
            blocked: HashMap::new(),
        };
        cycle.prewarm()?;

        info!(
            symbols = cycle.watchlist.len(),
            templates = cycle.shared.templates.entry_count(),
            quotes = cycle.shared.quotes.len(),
            data_dir = %cycle.writer.base_dir().display(),
            "Trading cycle ready"
        );
        Ok(cycle)
    }

    fn prewarm(&self) -> AppResult<()> {
        for (_, entry) in self.watchlist.iter() {
            let market_id = entry.market_id();
            for side in [MarketSide::Yes, MarketSide::No] {
                self.upsert_template(market_id.clone(), entry.token_id(side), side);
            }
            let seeds = [
                (MarketSide::Yes, entry.yes_price),
                (MarketSide::No, entry.no_price),
            ];
            for (side, price) in seeds {
                if let Some(price) = price {
                    self.shared
                        .quotes
                        .update(market_id.clone(), side, Price::new(price))?;
                }
            }
        }
        Ok(())
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    pub fn status(&self) -> &StatusState {
        &self.shared.status
    }

    pub async fn run_cycle(&mut self) -> AppResult<CycleSummary> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Settle due positions, evaluate every watched symbol at `now`, then
    /// dispatch.
    ///
    /// Only an inconsistent risk verdict is returned as an error; per-symbol
    /// and per-order failures are logged and recorded in status.
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> AppResult<CycleSummary> {
        let started = Instant::now();
        let mut summary = CycleSummary::default();

        self.settle(now, &mut summary).await;

        let watchlist = self.watchlist.clone();
        for (symbol, entry) in watchlist.iter() {
            self.evaluate_symbol(symbol, entry, now, &mut summary)?;
        }

        self.dispatch(now, &mut summary).await;

        Metrics::queue_size(self.shared.queue.len());
        Metrics::template_cache_size(self.shared.templates.len());
        Metrics::cycle_latency(started.elapsed().as_secs_f64() * 1000.0);

        debug!(?summary, "Cycle complete");
        Ok(summary)
    }

    fn evaluate_symbol(
        &mut self,
        symbol: &Symbol,
        entry: &WatchlistEntry,
        now: DateTime<Utc>,
        summary: &mut CycleSummary,
    ) -> AppResult<()> {
        summary.symbols += 1;
        let ingestor = self.shared.ingestor.clone();

        let pair = ingestor.latest_at(symbol, now);
        let window = ingestor.window(symbol);
        let report = self.engine.evaluate(symbol, pair.as_ref(), &window, now);

        if let Some(snapshot) = &report.snapshot {
            summary.snapshots += 1;
            Metrics::divergence(symbol.as_str(), snapshot.divergence_bps());
            self.shared.status.record_cycle(snapshot, &report.outcome);
            self.persist(EventRecord::from_snapshot(snapshot));
        }

        let inputs = RiskInputs {
            live_age_ms: ingestor.live_age_ms(symbol),
            reference_age_ms: ingestor.reference_age_ms(symbol),
            regime_too_calm: report.regime_too_calm,
        };
        let verdict = self.shared.risk_gate.evaluate_at(&inputs, now);
        verdict.validate()?;

        self.observe_verdict(symbol, &verdict);
        self.persist(EventRecord::from_risk_result(&verdict, Some(symbol.as_str())));
        self.shared.status.record_risk(verdict.clone());
        if !verdict.trading_allowed {
            summary.blocked_symbols += 1;
        }

        let Some(decision) = report.outcome.decision() else {
            Metrics::cycle_skipped(report.outcome.as_str());
            return Ok(());
        };
        summary.decisions += 1;
        Metrics::decision(
            decision.trigger_type.as_str(),
            &decision.direction.to_string(),
        );
        self.persist(EventRecord::from_decision(decision));

        if !verdict.trading_allowed {
            debug!(
                %symbol,
                trigger = %decision.trigger_type,
                failed = ?verdict.failed_checks(),
                "Decision withheld by risk gate"
            );
            return Ok(());
        }

        match self.publisher.publish(decision) {
            Ok(key) => {
                summary.published += 1;
                info!(
                    %symbol,
                    %key,
                    trigger = %decision.trigger_type,
                    direction = %decision.direction,
                    confidence = decision.confidence,
                    "Edge decision published"
                );
            }
            Err(e) => {
                warn!(%symbol, error = %e, "Failed to publish decision");
                self.shared
                    .status
                    .record_error(format!("publish {symbol}: {e}"));
            }
        }

        if self.enqueue_candidate(entry, decision, now) {
            summary.enqueued += 1;
        }
        Ok(())
    }

    fn observe_verdict(&mut self, symbol: &Symbol, verdict: &RiskGateResult) {
        Metrics::trading_allowed(verdict.trading_allowed);

        let failed: HashSet<CheckName> = verdict
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name)
            .collect();
        let previous = self.blocked.remove(symbol).unwrap_or_default();

        for check in verdict.checks.iter().filter(|c| !c.passed) {
            Metrics::gate_blocked(check.name.as_str(), check.severity.as_str());
            if !previous.contains(&check.name) {
                warn!(
                    %symbol,
                    check = %check.name.as_str(),
                    severity = %check.severity.as_str(),
                    message = %check.message,
                    "Gate block started"
                );
            }
        }
        for name in previous.difference(&failed) {
            info!(%symbol, check = %name.as_str(), "Gate block cleared");
        }

        if !failed.is_empty() {
            self.blocked.insert(symbol.clone(), failed);
        }
    }

    fn enqueue_candidate(
        &self,
        entry: &WatchlistEntry,
        decision: &EdgeDecision,
        now: DateTime<Utc>,
    ) -> bool {
        let side = MarketSide::for_direction(decision.direction);
        let market_id = entry.market_id();

        let Some(quote) = self
            .shared
            .quotes
            .get_fresh(&market_id, side, now, self.max_quote_age_ms)
        else {
            debug!(%market_id, %side, "No fresh quote for market side");
            return false;
        };

        let probability = decision.confidence / 100.0;
        let Some(amount) = self.sizer.size(probability, quote.price) else {
            debug!(
                %market_id,
                %side,
                probability,
                price = %quote.price,
                "No positive edge at quote"
            );
            return false;
        };

        let draft = CandidateDraft {
            token_id: entry.token_id(side),
            market_id,
            side,
            price: quote.price,
            amount,
            confidence: decision.confidence,
            edge: KellySizer::edge(probability, quote.price),
            hours_to_resolution: entry.hours_to_resolution(now),
            volume_24h: entry.volume_24h,
            source: decision.trigger_type.as_str().to_string(),
        };

        let outcome = self.shared.queue.enqueue_at(draft, now);
        Metrics::queue_admission(outcome.as_str());
        match &outcome {
            EnqueueOutcome::AdmittedWithEviction { id, evicted, .. } => {
                debug!(%id, evicted_id = %evicted.id, "Candidate displaced lowest priority");
            }
            EnqueueOutcome::Rejected(reason) => {
                debug!(symbol = %entry.symbol, reason = reason.as_str(), "Candidate rejected");
            }
            EnqueueOutcome::Admitted { .. } => {}
        }
        outcome.is_admitted()
    }

    /// Close due positions and feed their PnL to the drawdown check.
    async fn settle(&mut self, now: DateTime<Utc>, summary: &mut CycleSummary) {
        let sink = self.sink.clone();
        let quotes = self.shared.quotes.clone();

        let trades = match sink.settle(&quotes, now, self.max_quote_age_ms).await {
            Ok(trades) => trades,
            Err(e) => {
                warn!(error = %e, "Position settlement failed");
                self.shared.status.record_error(format!("settle: {e}"));
                return;
            }
        };

        for trade in trades {
            summary.settled += 1;
            self.shared.risk_gate.record_trade(trade.pnl_usd, trade.closed_at);
            let result = match trade.pnl_usd.cmp(&Decimal::ZERO) {
                Ordering::Greater => "win",
                Ordering::Less => "loss",
                Ordering::Equal => "flat",
            };
            Metrics::position_settled(result);
            info!(
                market_id = %trade.market_id,
                side = %trade.side,
                entry = %trade.entry_price,
                exit = %trade.exit_price,
                pnl_usd = %trade.pnl_usd,
                "Position settled"
            );
        }
    }

    async fn dispatch(&mut self, now: DateTime<Utc>, summary: &mut CycleSummary) {
        let batch = self.shared.queue.dequeue_batch(self.dispatch_batch_size);

        for candidate in batch {
            let payload = match self.prepare_order(&candidate, now) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(
                        id = %candidate.id,
                        market_id = %candidate.market_id,
                        error = %e,
                        "Template fill failed"
                    );
                    self.shared
                        .status
                        .record_error(format!("fill {}: {e}", candidate.market_id));
                    continue;
                }
            };

            match self.sink.submit(&payload).await {
                Ok(()) => {
                    summary.dispatched += 1;
                    Metrics::order_dispatched();
                    debug!(
                        id = %candidate.id,
                        market_id = %candidate.market_id,
                        priority = candidate.priority_score,
                        template_age_ms = payload.metadata.template_age_ms,
                        "Order dispatched"
                    );
                }
                Err(e) => {
                    warn!(id = %candidate.id, error = %e, "Order submission failed");
                    self.shared
                        .status
                        .record_error(format!("submit {}: {e}", candidate.market_id));
                }
            }
        }
    }

    /// Fill the candidate into its template. A template evicted or refreshed
    /// between read and fill is rebuilt once.
    fn prepare_order(
        &self,
        candidate: &TradeCandidate,
        now: DateTime<Utc>,
    ) -> Result<OrderPayload, TemplateError> {
        let templates = &self.shared.templates;
        let template = templates
            .get(&candidate.market_id, candidate.side)
            .unwrap_or_else(|| {
                self.upsert_template(
                    candidate.market_id.clone(),
                    candidate.token_id.clone(),
                    candidate.side,
                )
            });

        let payload = match templates.fill_at(&template, candidate.price, candidate.amount, now) {
            Err(TemplateError::TemplateEvicted { nonce, .. }) => {
                debug!(market_id = %candidate.market_id, nonce, "Template evicted, rebuilding");
                let fresh = self.upsert_template(
                    candidate.market_id.clone(),
                    candidate.token_id.clone(),
                    candidate.side,
                );
                templates.fill_at(&fresh, candidate.price, candidate.amount, now)
            }
            other => other,
        }?;
        Metrics::template_filled();
        Ok(payload)
    }

    fn upsert_template(
        &self,
        market_id: MarketId,
        token_id: TokenId,
        side: MarketSide,
    ) -> OrderTemplate {
        let (template, evicted) =
            self.shared
                .templates
                .upsert(market_id, token_id, side, self.maker.clone());
        if evicted > 0 {
            Metrics::template_evicted(evicted);
        }
        template
    }

    fn persist(&mut self, record: EventRecord) {
        if let Err(e) = self.writer.append(record) {
            warn!(error = %e, "Failed to persist event");
            self.shared.status.record_error(format!("event log: {e}"));
        }

        let dropped = self.writer.dropped();
        if dropped > self.events_dropped {
            Metrics::events_dropped(dropped - self.events_dropped);
            self.shared.status.set_events_dropped(dropped);
            self.events_dropped = dropped;
        }
    }

    /// Drop undispatched candidates and close the event log.
    pub fn close(&mut self) -> AppResult<()> {
        let pending = self.shared.queue.drain();
        if !pending.is_empty() {
            info!(count = pending.len(), "Discarding undispatched candidates");
        }
        self.writer.close()?;
        info!(total_written = self.writer.total_written(), "Event log closed");
        Ok(())
    }
}
