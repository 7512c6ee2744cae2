//! Application wiring and task lifecycle.

use crate::config::{AppConfig, WatchlistEntry};
use crate::cycle::{SharedState, TradingCycle};
use crate::error::{AppError, AppResult};
use crate::kill_switch::{HttpFlagSource, KillSwitchPoller};
use crate::kv::SharedKvStore;
use crate::sink::{ExecutionSink, PaperExecutionSink};
use lagarb_dashboard::run_server;
use lagarb_feed::{
    HttpQuoteSource, HttpReferenceSource, LiveFeedConnection, QuotePoller, ReferencePoller,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct Application {
    config: AppConfig,
    shared: SharedState,
    store: Arc<SharedKvStore>,
    sink: Arc<dyn ExecutionSink>,
    shutdown: CancellationToken,
}

impl Application {
    /// Paper-trading application.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let sink = PaperExecutionSink::with_config(config.paper.clone());
        Self::with_sink(config, Arc::new(sink))
    }

    pub fn with_sink(config: AppConfig, sink: Arc<dyn ExecutionSink>) -> AppResult<Self> {
        config.validate()?;
        let shared = SharedState::new(&config);

        info!(
            namespace = %config.namespace,
            symbols = config.watchlist.len(),
            cycle_interval_ms = config.cycle_interval_ms,
            "Application initialized"
        );

        Ok(Self {
            config,
            shared,
            store: Arc::new(SharedKvStore::new()),
            sink,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn shared(&self) -> &SharedState {
        &self.shared
    }

    /// Store holding published decisions.
    pub fn kv_store(&self) -> Arc<SharedKvStore> {
        self.store.clone()
    }

    /// Cancelling this token stops every task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> AppResult<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(?e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Run until `stop` completes or the shutdown token is cancelled. The
    /// token is cancelled on every exit, including errors.
    pub async fn run_until<F>(self, stop: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let shutdown = self.shutdown.clone();
        let result = self.serve(stop).await;
        if let Err(e) = &result {
            error!(error = %e, "Engine stopped with error");
        }
        shutdown.cancel();
        result
    }

    /// Every fallible component is built before the first task is spawned,
    /// so a construction error leaves nothing running.
    async fn serve<F>(self, stop: F) -> AppResult<()>
    where
        F: Future<Output = ()>,
    {
        let symbols = self.config.symbols()?;

        let feed = if self.config.live_feed.streams.is_empty() {
            warn!("No live feed streams configured");
            None
        } else {
            Some(LiveFeedConnection::new(
                self.config.live_feed.clone(),
                self.shared.ingestor.clone(),
                self.shutdown.clone(),
            )?)
        };

        let reference = &self.config.reference;
        let reference_poller = ReferencePoller::new(
            reference.clone(),
            HttpReferenceSource::new(
                reference.url.clone(),
                Duration::from_millis(reference.timeout_ms),
            )?,
            symbols,
            self.shared.ingestor.clone(),
            self.shutdown.clone(),
        );

        let quote_poller = if self.config.quotes.enabled {
            let quotes = &self.config.quotes;
            let markets = self
                .config
                .watchlist
                .iter()
                .map(WatchlistEntry::market_id)
                .collect();
            Some(QuotePoller::new(
                quotes.clone(),
                HttpQuoteSource::new(quotes.url.clone(), Duration::from_millis(quotes.timeout_ms))?,
                markets,
                self.shared.quotes.clone(),
                self.shutdown.clone(),
            ))
        } else {
            None
        };

        let kill_switch = if self.config.kill_switch.enabled {
            let ks = &self.config.kill_switch;
            Some(
                KillSwitchPoller::new(
                    ks.clone(),
                    HttpFlagSource::new(ks.url.clone(), Duration::from_millis(ks.timeout_ms))?,
                    self.shared.risk_gate.kill_switch(),
                    self.shared.risk_gate.manipulation_flag(),
                    self.shutdown.clone(),
                )
                .with_status(self.shared.status.clone()),
            )
        } else {
            None
        };

        let cycle = TradingCycle::new(
            &self.config,
            self.shared.clone(),
            self.sink.clone(),
            self.store.clone(),
        )?;

        let mut tasks: Vec<(&'static str, JoinHandle<()>)> = Vec::new();
        if let Some(feed) = feed {
            tasks.push(("live_feed", tokio::spawn(async move { feed.run().await })));
        }
        tasks.push((
            "reference_poller",
            tokio::spawn(async move { reference_poller.run().await }),
        ));
        if let Some(poller) = quote_poller {
            tasks.push(("quote_poller", tokio::spawn(async move { poller.run().await })));
        }
        if let Some(poller) = kill_switch {
            tasks.push(("kill_switch", tokio::spawn(async move { poller.run().await })));
        }
        if self.config.status.enabled {
            let state = self.shared.status.clone();
            let config = self.config.status.clone();
            let token = self.shutdown.clone();
            tasks.push((
                "status_server",
                tokio::spawn(async move {
                    if let Err(e) = run_server(state, config, token).await {
                        error!(error = %e, "Status server failed");
                    }
                }),
            ));
        }

        let cycle_handle = tokio::spawn(cycle_loop(
            cycle,
            Duration::from_millis(self.config.cycle_interval_ms),
            self.shutdown.clone(),
        ));

        info!(tasks = tasks.len() + 1, "Engine running");
        tokio::select! {
            _ = stop => info!("Shutdown signal received"),
            _ = self.shutdown.cancelled() => warn!("Shutdown requested"),
        }
        self.shutdown.cancel();

        let cycle_result = cycle_handle
            .await
            .map_err(|e| AppError::Task(format!("cycle: {e}")));
        for (name, handle) in tasks {
            if let Err(e) = handle.await {
                warn!(task = name, error = %e, "Task ended abnormally");
            }
        }

        let mut cycle = cycle_result??;
        cycle.close()?;
        info!("Shutdown complete");
        Ok(())
    }
}

/// Run cycles on a fixed interval. A fatal error cancels `shutdown` and is
/// returned; anything else is logged and the next tick proceeds.
async fn cycle_loop(
    mut cycle: TradingCycle,
    interval: Duration,
    shutdown: CancellationToken,
) -> AppResult<TradingCycle> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut cycles = 0u64;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                cycles += 1;
                match cycle.run_cycle().await {
                    Ok(summary) if summary.dispatched > 0 => {
                        info!(cycle = cycles, dispatched = summary.dispatched, "Orders dispatched");
                    }
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        error!(error = %e, "Fatal cycle error, stopping");
                        shutdown.cancel();
                        return Err(e);
                    }
                    Err(e) => {
                        warn!(error = %e, "Cycle failed");
                        cycle.status().record_error(e.to_string());
                    }
                }
            }
        }
    }

    info!(cycles, "Cycle loop stopped");
    Ok(cycle)
}
