//! Live trade feed over websocket.
//!
//! Handles the connection lifecycle, automatic reconnection with exponential
//! backoff and a receive timeout that marks the feed reconnecting when the
//! exchange goes quiet.

use crate::error::{FeedError, FeedResult};
use crate::ingestor::{FeedState, StreamIngestor};
use crate::parser::TradeParser;
use futures_util::{SinkExt, StreamExt};
use lagarb_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Live feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveFeedConfig {
    /// Websocket URL.
    #[serde(default = "default_url")]
    pub url: String,
    /// Exchange stream symbol per tracked symbol, e.g. `BTC = "BTCUSDT"`.
    #[serde(default)]
    pub streams: std::collections::BTreeMap<String, String>,
    /// Send a SUBSCRIBE frame after connecting.
    #[serde(default = "default_true")]
    pub send_subscribe: bool,
    #[serde(default = "default_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// Reconnect if nothing arrives for this long.
    #[serde(default = "default_recv_timeout_ms")]
    pub recv_timeout_ms: u64,
}

fn default_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_recv_timeout_ms() -> u64 {
    10_000
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            streams: std::collections::BTreeMap::new(),
            send_subscribe: true,
            reconnect_base_delay_ms: default_base_delay_ms(),
            reconnect_max_delay_ms: default_max_delay_ms(),
            recv_timeout_ms: default_recv_timeout_ms(),
        }
    }
}

impl LiveFeedConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("live feed url is empty".to_string());
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err("reconnect_base_delay_ms must be positive".to_string());
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err("reconnect_max_delay_ms must be >= reconnect_base_delay_ms".to_string());
        }
        if self.recv_timeout_ms == 0 {
            return Err("recv_timeout_ms must be positive".to_string());
        }
        Ok(())
    }

    /// Build the parser from the stream map.
    pub fn parser(&self) -> FeedResult<TradeParser> {
        let mut parser = TradeParser::new();
        for (symbol, stream) in &self.streams {
            parser = parser.with_alias(stream, lagarb_core::Symbol::new(symbol)?);
        }
        Ok(parser)
    }

    fn subscribe_frame(&self) -> String {
        let params: Vec<String> = self
            .streams
            .values()
            .map(|s| format!("{}@trade", s.to_ascii_lowercase()))
            .collect();
        serde_json::json!({ "method": "SUBSCRIBE", "params": params, "id": 1 }).to_string()
    }
}

/// Exponential backoff: `base * 2^(attempt-1)` capped at `max`, plus jitter.
pub(crate) fn backoff_delay(base_ms: u64, max_ms: u64, attempt: u32, jitter_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base_ms.saturating_mul(1u64 << exponent).min(max_ms);
    Duration::from_millis(delay + jitter_ms)
}

/// Pseudo-random jitter in `[0, bound)` from the clock's sub-second nanos.
pub(crate) fn clock_jitter(bound_ms: u64) -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    if bound_ms == 0 {
        return 0;
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    u64::from(nanos) % bound_ms
}

/// Websocket consumer writing live trades into the ingestor.
pub struct LiveFeedConnection {
    config: LiveFeedConfig,
    parser: TradeParser,
    ingestor: Arc<StreamIngestor>,
    shutdown: CancellationToken,
}

impl LiveFeedConnection {
    pub fn new(
        config: LiveFeedConfig,
        ingestor: Arc<StreamIngestor>,
        shutdown: CancellationToken,
    ) -> FeedResult<Self> {
        let parser = config.parser()?;
        Ok(Self {
            config,
            parser,
            ingestor,
            shutdown,
        })
    }

    /// Run until the shutdown token is cancelled. Connection failures are
    /// retried forever.
    pub async fn run(&self) {
        let mut attempt = 0u32;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.ingestor.set_feed_state(FeedState::Connecting);

            match self.try_connect(&mut attempt).await {
                Ok(()) => info!("Live feed connection closed"),
                Err(e) => {
                    error!(error = %e, "Live feed connection error");
                    self.ingestor.record_reconnect(&e.to_string());
                    Metrics::feed_reconnect(reconnect_reason(&e));
                }
            }
            Metrics::feed_disconnected();

            if self.shutdown.is_cancelled() {
                break;
            }

            attempt = attempt.saturating_add(1);
            self.ingestor.set_feed_state(FeedState::Reconnecting);

            let delay = backoff_delay(
                self.config.reconnect_base_delay_ms,
                self.config.reconnect_max_delay_ms,
                attempt,
                clock_jitter(1000),
            );
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting live feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown.cancelled() => break,
            }
        }

        self.ingestor.set_feed_state(FeedState::Disconnected);
        Metrics::feed_disconnected();
        info!("Live feed stopped");
    }

    async fn try_connect(&self, attempt: &mut u32) -> FeedResult<()> {
        info!(url = %self.config.url, "Connecting to live feed");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        if self.config.send_subscribe && !self.config.streams.is_empty() {
            write
                .send(Message::Text(self.config.subscribe_frame()))
                .await?;
        }

        *attempt = 0;
        self.ingestor.set_feed_state(FeedState::Connected);
        Metrics::feed_connected();
        info!(streams = self.config.streams.len(), "Live feed connected");

        let recv_timeout = Duration::from_millis(self.config.recv_timeout_ms);

        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not sent");
                    }
                    return Ok(());
                }

                next = tokio::time::timeout(recv_timeout, read.next()) => {
                    let msg = match next {
                        Ok(msg) => msg,
                        Err(_) => return Err(FeedError::ReceiveTimeout(self.config.recv_timeout_ms)),
                    };
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.ingestor.record_feed_message();
                            self.handle_text(&text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            self.ingestor.record_feed_message();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Live feed closed by server");
                            return Err(FeedError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("Live feed stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match self.parser.parse(text) {
            Ok(Some(tick)) => {
                if let Err(e) = self
                    .ingestor
                    .record_live(&tick.symbol, tick.price, tick.timestamp)
                {
                    warn!(error = %e, "Live sample rejected");
                }
            }
            Ok(None) => {}
            Err(FeedError::UnknownSymbol(s)) => debug!(stream = %s, "Trade for untracked symbol"),
            Err(e) => {
                Metrics::feed_parse_error();
                debug!(error = %e, "Unparseable live feed frame");
            }
        }
    }
}

fn reconnect_reason(err: &FeedError) -> &'static str {
    match err {
        FeedError::ReceiveTimeout(_) => "timeout",
        FeedError::ConnectionClosed { .. } => "closed",
        _ => "error",
    }
}
