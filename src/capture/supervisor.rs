//! Capture Supervisor
//!
//! Runs one capture session at a time against a [`CaptureSource`], turns
//! each raw payload into a strike and hands it to the [`RelayHub`].
//! A failed session is restarted after a fixed delay until shutdown.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::decode::decode;
use super::error::CaptureError;
use super::extract::StrikeExtractor;
use super::source::{CaptureEvent, CaptureSession, CaptureSource};
use super::types::{SessionState, StrikeEvent};
use crate::websocket::RelayHub;

/// Characters of raw payload shown in stream-data logs
const RAW_PREVIEW_CHARS: usize = 100;

/// Characters of decoded text shown in stream-data logs
const DECODED_PREVIEW_CHARS: usize = 150;

/// Configuration for the capture supervisor
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Delay between a session failure and the next start
    pub restart_delay: Duration,
    /// Upper bound on closing a session
    pub close_timeout: Duration,
    /// Log payload previews at debug level
    pub log_stream_data: bool,
    /// Carry extra upstream fields into strikes
    pub carry_upstream_fields: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_secs(10),
            close_timeout: Duration::from_secs(1),
            log_stream_data: false,
            carry_upstream_fields: false,
        }
    }
}

/// Running counters for the capture pipeline
#[derive(Debug, Default)]
pub struct CaptureStats {
    sessions_started: AtomicU64,
    session_failures: AtomicU64,
    payloads: AtomicU64,
    strikes: AtomicU64,
    rejected: AtomicU64,
}

/// Point-in-time copy of [`CaptureStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStatsSnapshot {
    pub sessions_started: u64,
    pub session_failures: u64,
    pub payloads: u64,
    pub strikes: u64,
    pub rejected: u64,
}

impl CaptureStats {
    pub fn snapshot(&self) -> CaptureStatsSnapshot {
        CaptureStatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            session_failures: self.session_failures.load(Ordering::Relaxed),
            payloads: self.payloads.load(Ordering::Relaxed),
            strikes: self.strikes.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

/// Supervises the upstream capture session
pub struct CaptureSupervisor {
    source: Arc<dyn CaptureSource>,
    hub: Arc<RelayHub>,
    extractor: StrikeExtractor,
    config: SupervisorConfig,
    state_tx: watch::Sender<SessionState>,
    stats: Arc<CaptureStats>,
}

impl CaptureSupervisor {
    pub fn new(source: Arc<dyn CaptureSource>, hub: Arc<RelayHub>, config: SupervisorConfig) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Starting);

        Self {
            source,
            hub,
            extractor: StrikeExtractor::new(config.carry_upstream_fields),
            config,
            state_tx,
            stats: Arc::new(CaptureStats::default()),
        }
    }

    /// Watch the session state
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    pub fn stats(&self) -> Arc<CaptureStats> {
        Arc::clone(&self.stats)
    }

    /// Start the supervisor background task
    pub fn start(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Run sessions until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            self.set_state(SessionState::Starting);
            tracing::info!(source = self.source.name(), "Starting capture session");

            let started = tokio::select! {
                result = self.source.start() => result,
                _ = shutdown.cancelled() => break,
            };

            let error = match started {
                Ok(mut session) => {
                    self.stats.sessions_started.fetch_add(1, Ordering::Relaxed);
                    self.set_state(SessionState::Active);

                    let result = self.drive(session.as_mut(), &shutdown).await;
                    if tokio::time::timeout(self.config.close_timeout, session.close())
                        .await
                        .is_err()
                    {
                        tracing::warn!(
                            source = self.source.name(),
                            "Capture session did not close within {:?}, abandoning it",
                            self.config.close_timeout
                        );
                    }

                    match result {
                        Ok(()) => break,
                        Err(e) => e,
                    }
                }
                Err(e) => e,
            };

            self.stats.session_failures.fetch_add(1, Ordering::Relaxed);
            self.set_state(SessionState::Failed);

            if shutdown.is_cancelled() {
                break;
            }

            tracing::warn!(
                source = self.source.name(),
                error = %error,
                "Capture session failed, restarting in {:?}",
                self.config.restart_delay
            );

            tokio::select! {
                _ = tokio::time::sleep(self.config.restart_delay) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Capture: shutdown during restart delay");
                    break;
                }
            }
        }

        self.set_state(SessionState::Terminated);
        tracing::info!("Capture supervisor stopped");
    }

    /// Pump one session. `Ok(())` means shutdown was requested.
    async fn drive(
        &self,
        session: &mut dyn CaptureSession,
        shutdown: &CancellationToken,
    ) -> Result<(), CaptureError> {
        loop {
            let event = tokio::select! {
                event = session.next_event() => event?,
                _ = shutdown.cancelled() => return Ok(()),
            };

            match event {
                CaptureEvent::ConnectionCreated { url } => {
                    tracing::info!(url = %url, "Upstream connection created");
                }
                CaptureEvent::ConnectionClosed { reason } => {
                    tracing::info!(reason = %reason, "Upstream connection closed");
                }
                CaptureEvent::Payload(raw) => {
                    self.handle_payload(&raw).await;
                }
            }
        }
    }

    /// Decode, extract and forward one raw payload.
    ///
    /// Returns the strike if one was ingested.
    pub async fn handle_payload(&self, raw: &str) -> Option<StrikeEvent> {
        self.stats.payloads.fetch_add(1, Ordering::Relaxed);

        let decoded = decode(raw);

        if self.config.log_stream_data {
            tracing::debug!(payload = %preview(raw, RAW_PREVIEW_CHARS), "Upstream frame received");
            tracing::debug!(decoded = %preview(&decoded, DECODED_PREVIEW_CHARS), "Upstream frame decoded");
        }

        match self.extractor.extract(&decoded) {
            Ok(strike) => {
                self.stats.strikes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(strike_id = %strike.id, lat = strike.lat, lng = strike.lng, "Extracted strike");
                self.hub.ingest(strike.clone()).await;
                Some(strike)
            }
            Err(rejected) => {
                self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(kind = rejected.kind(), reason = %rejected, "Rejected upstream frame");
                None
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }
}

fn preview(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
