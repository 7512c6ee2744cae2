//! External flag poller driving the kill-switch and manipulation latches.
//!
//! The remote document is `{"kill_switch": bool, "manipulation_flag": bool,
//! "reason": "..."}`. A latch the poller engaged is released when the remote
//! clears its flag; a latch engaged by someone else is left alone.

use crate::error::{AppError, AppResult};
use lagarb_dashboard::StatusState;
use lagarb_feed::BoxFuture;
use lagarb_risk::FlagLatch;
use lagarb_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillSwitchConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_timeout_ms() -> u64 {
    500
}

impl Default for KillSwitchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            interval_ms: default_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl KillSwitchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.enabled {
            return Ok(());
        }
        if self.url.is_empty() {
            return Err("kill_switch.url is required when enabled".to_string());
        }
        if self.interval_ms == 0 || self.timeout_ms == 0 {
            return Err("kill_switch interval_ms and timeout_ms must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalFlags {
    #[serde(default)]
    pub kill_switch: bool,
    #[serde(default)]
    pub manipulation_flag: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

pub trait FlagSource: Send + Sync {
    fn fetch(&self) -> BoxFuture<'_, AppResult<ExternalFlags>>;
}

pub struct HttpFlagSource {
    client: reqwest::Client,
    url: String,
}

impl HttpFlagSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::FlagSource(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn fetch_inner(&self) -> AppResult<ExternalFlags> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AppError::FlagSource(e.to_string()))?;
        response
            .json::<ExternalFlags>()
            .await
            .map_err(|e| AppError::FlagSource(e.to_string()))
    }
}

impl FlagSource for HttpFlagSource {
    fn fetch(&self) -> BoxFuture<'_, AppResult<ExternalFlags>> {
        Box::pin(self.fetch_inner())
    }
}

/// Tracks whether this poller engaged a latch.
struct MirroredLatch {
    latch: Arc<FlagLatch>,
    engaged_by_us: AtomicBool,
}

impl MirroredLatch {
    fn apply(&self, remote: bool, reason: &str) {
        if remote {
            if !self.latch.is_triggered() && self.latch.trigger(reason) {
                self.engaged_by_us.store(true, Ordering::SeqCst);
            }
        } else if self.engaged_by_us.swap(false, Ordering::SeqCst) {
            self.latch.reset();
        }
    }
}

pub struct KillSwitchPoller<S: FlagSource> {
    config: KillSwitchConfig,
    source: S,
    kill_switch: MirroredLatch,
    manipulation: MirroredLatch,
    status: Option<StatusState>,
    shutdown: CancellationToken,
}

impl<S: FlagSource> KillSwitchPoller<S> {
    pub fn new(
        config: KillSwitchConfig,
        source: S,
        kill_switch: Arc<FlagLatch>,
        manipulation: Arc<FlagLatch>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            source,
            kill_switch: MirroredLatch {
                latch: kill_switch,
                engaged_by_us: AtomicBool::new(false),
            },
            manipulation: MirroredLatch {
                latch: manipulation,
                engaged_by_us: AtomicBool::new(false),
            },
            status: None,
            shutdown,
        }
    }

    /// Report poll failures in the engine status.
    pub fn with_status(mut self, status: StatusState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn apply(&self, flags: &ExternalFlags) {
        let reason = flags.reason.as_deref().unwrap_or("remote flag");
        self.kill_switch.apply(flags.kill_switch, reason);
        self.manipulation.apply(flags.manipulation_flag, reason);
    }

    /// Fetch once. Fetch failures leave the latches as they are.
    pub async fn poll_once(&self) -> AppResult<()> {
        let timeout = Duration::from_millis(self.config.timeout_ms);
        let flags = tokio::time::timeout(timeout, self.source.fetch())
            .await
            .map_err(|_| AppError::FlagSource(format!("timed out after {timeout:?}")))??;
        self.apply(&flags);
        Ok(())
    }

    /// Poll once and record the result in metrics and status.
    pub async fn tick(&self) -> bool {
        match self.poll_once().await {
            Ok(()) => {
                if let Some(status) = &self.status {
                    status.record_kill_switch_poll(None);
                }
                true
            }
            Err(e) => {
                warn!(error = %e, "Kill switch poll failed");
                Metrics::kill_switch_poll_failed();
                if let Some(status) = &self.status {
                    status.record_kill_switch_poll(Some(&e.to_string()));
                }
                false
            }
        }
    }

    pub async fn run(&self) {
        info!(url = %self.config.url, interval_ms = self.config.interval_ms, "Kill switch poller started");
        let interval = Duration::from_millis(self.config.interval_ms);

        loop {
            self.tick().await;
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Kill switch poller stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Scripted(Mutex<Vec<AppResult<ExternalFlags>>>);

    impl FlagSource for Scripted {
        fn fetch(&self) -> BoxFuture<'_, AppResult<ExternalFlags>> {
            let next = self.0.lock().remove(0);
            Box::pin(async move { next })
        }
    }

    fn poller(script: Vec<AppResult<ExternalFlags>>) -> KillSwitchPoller<Scripted> {
        KillSwitchPoller::new(
            KillSwitchConfig {
                enabled: true,
                url: "http://localhost/flags".to_string(),
                ..KillSwitchConfig::default()
            },
            Scripted(Mutex::new(script)),
            Arc::new(FlagLatch::new("kill_switch")),
            Arc::new(FlagLatch::new("manipulation_flag")),
            CancellationToken::new(),
        )
    }

    fn engaged(reason: &str) -> ExternalFlags {
        ExternalFlags {
            kill_switch: true,
            manipulation_flag: false,
            reason: Some(reason.to_string()),
        }
    }

    #[tokio::test]
    async fn test_remote_engage_and_release() {
        let p = poller(vec![Ok(engaged("ops halt")), Ok(ExternalFlags::default())]);

        p.poll_once().await.unwrap();
        assert!(p.kill_switch.latch.is_triggered());
        assert_eq!(p.kill_switch.latch.reason().as_deref(), Some("ops halt"));
        assert!(!p.manipulation.latch.is_triggered());

        p.poll_once().await.unwrap();
        assert!(!p.kill_switch.latch.is_triggered());
    }

    #[tokio::test]
    async fn test_does_not_release_foreign_latch() {
        let p = poller(vec![Ok(ExternalFlags::default())]);
        p.kill_switch.latch.trigger("operator");
        p.poll_once().await.unwrap();
        assert!(p.kill_switch.latch.is_triggered());
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_state() {
        let p = poller(vec![
            Ok(engaged("halt")),
            Err(AppError::FlagSource("down".to_string())),
        ]);
        p.poll_once().await.unwrap();
        assert!(p.poll_once().await.is_err());
        assert!(p.kill_switch.latch.is_triggered());
    }

    #[tokio::test]
    async fn test_poll_failure_reaches_status() {
        let status = crate::cycle::SharedState::new(&crate::AppConfig::default()).status;
        let p = poller(vec![
            Err(AppError::FlagSource("connection refused".to_string())),
            Err(AppError::FlagSource("timed out".to_string())),
            Ok(ExternalFlags::default()),
        ])
        .with_status(status.clone());

        assert!(!p.tick().await);
        assert!(!p.tick().await);
        let snap = status.collect_snapshot();
        assert_eq!(snap.kill_switch_failures, 2);
        let message = snap.last_error.unwrap().message;
        assert!(message.contains("2 consecutive"));
        assert!(message.contains("timed out"));

        assert!(p.tick().await);
        assert_eq!(status.collect_snapshot().kill_switch_failures, 0);
    }

    #[tokio::test]
    async fn test_sustained_remote_flag_keeps_first_reason() {
        let p = poller(vec![Ok(engaged("first")), Ok(engaged("second"))]);
        p.poll_once().await.unwrap();
        p.poll_once().await.unwrap();
        assert_eq!(p.kill_switch.latch.reason().as_deref(), Some("first"));
        assert!(p.kill_switch.engaged_by_us.load(Ordering::SeqCst));
    }

    #[test]
    fn test_flags_parse_partial() {
        let flags: ExternalFlags = serde_json::from_str(r#"{"manipulation_flag": true}"#).unwrap();
        assert!(flags.manipulation_flag);
        assert!(!flags.kill_switch);
    }

    #[test]
    fn test_validate() {
        assert!(KillSwitchConfig::default().validate().is_ok());
        let config = KillSwitchConfig {
            enabled: true,
            ..KillSwitchConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
