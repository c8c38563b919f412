//! Relay Hub
//!
//! Owns the recent-strike history and the set of live subscribers.
//! Both live behind one lock, so an ingest-and-broadcast step is atomic with
//! respect to registration: a subscriber either sees a strike in its backlog
//! or receives it live, never both and never neither.
//!
//! Delivery never waits on a subscriber. Each connection has a bounded
//! queue; a full or closed queue gets the subscriber dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::capture::StrikeEvent;

/// Unique identifier for a subscriber connection
pub type ConnectionId = String;

/// Configuration for the relay hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of strikes kept in history
    pub max_strikes: usize,
    /// Push the current history to new subscribers
    pub send_backlog_on_connect: bool,
    /// Maximum number of concurrent subscribers
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_strikes: 100,
            send_backlog_on_connect: true,
            max_connections: 1000,
        }
    }
}

struct HubInner {
    /// Most-recent-first
    history: VecDeque<Arc<StrikeEvent>>,
    connections: HashMap<ConnectionId, mpsc::Sender<ServerMessage>>,
    closed: bool,
}

/// Fan-out point between the capture pipeline and subscribers
pub struct RelayHub {
    inner: RwLock<HubInner>,
    config: HubConfig,
}

impl RelayHub {
    /// Create a new hub. A `max_strikes` of zero is treated as one.
    pub fn new(mut config: HubConfig) -> Self {
        config.max_strikes = config.max_strikes.max(1);

        Self {
            inner: RwLock::new(HubInner {
                history: VecDeque::with_capacity(config.max_strikes.min(1024)),
                connections: HashMap::new(),
                closed: false,
            }),
            config,
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Record a strike and deliver it to every live subscriber.
    ///
    /// Returns the number of subscribers the strike was queued for.
    pub async fn ingest(&self, strike: StrikeEvent) -> usize {
        let strike = Arc::new(strike);
        let mut inner = self.inner.write().await;

        inner.history.push_front(Arc::clone(&strike));
        while inner.history.len() > self.config.max_strikes {
            inner.history.pop_back();
        }

        let mut delivered = 0;
        let mut dropped = Vec::new();

        for (id, sender) in inner.connections.iter() {
            match sender.try_send(ServerMessage::Strike(Arc::clone(&strike))) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(connection_id = %id, "Subscriber queue full, dropping slow subscriber");
                    dropped.push(id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    tracing::debug!(connection_id = %id, "Subscriber gone, removing");
                    dropped.push(id.clone());
                }
            }
        }

        for id in &dropped {
            inner.connections.remove(id);
        }

        tracing::trace!(
            strike_id = %strike.id,
            subscribers = delivered,
            dropped = dropped.len(),
            "Broadcast strike"
        );

        delivered
    }

    /// Register a new subscriber
    ///
    /// If backlog delivery is enabled and history is non-empty, the backlog
    /// is queued on `sender` before the subscriber becomes visible to ingest.
    pub async fn register(
        &self,
        sender: mpsc::Sender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut inner = self.inner.write().await;

        if inner.closed {
            return Err(HubError::ShuttingDown);
        }
        if inner.connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        if self.config.send_backlog_on_connect && !inner.history.is_empty() {
            let strikes = inner.history.iter().cloned().collect();
            sender
                .try_send(ServerMessage::backlog(strikes))
                .map_err(|_| HubError::SendFailed)?;
        }

        let id = Uuid::new_v4().to_string();
        inner.connections.insert(id.clone(), sender);

        tracing::info!(connection_id = %id, subscribers = inner.connections.len(), "Subscriber connected");
        Ok(id)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.inner.write().await.connections.remove(id).is_some();
        if removed {
            tracing::info!(connection_id = %id, "Subscriber disconnected");
        }
        removed
    }

    /// Drop every subscriber and refuse new ones.
    ///
    /// Dropping the queue senders ends each connection's writer task, which
    /// then closes its socket.
    pub async fn close_all(&self) -> usize {
        let mut inner = self.inner.write().await;
        inner.closed = true;
        let count = inner.connections.len();
        inner.connections.clear();

        tracing::info!(subscribers = count, "Closed all subscribers");
        count
    }

    /// Most recent strikes, most-recent-first, at most `limit` of them
    pub async fn snapshot(&self, limit: usize) -> Vec<Arc<StrikeEvent>> {
        self.inner
            .read()
            .await
            .history
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn history_len(&self) -> usize {
        self.inner.read().await.history.len()
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.inner.read().await.connections.len()
    }
}

/// Errors that can occur in the relay hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Failed to queue backlog")]
    SendFailed,

    #[error("Relay is shutting down")]
    ShuttingDown,
}
