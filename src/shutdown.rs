//! Process shutdown
//!
//! [`wait_for_shutdown_signal`] completes on SIGINT, SIGTERM or SIGQUIT
//! (Ctrl-C elsewhere). [`graceful_shutdown`] runs the orderly sequence under
//! a hard deadline.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::websocket::RelayHub;

/// How the orderly shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Everything stopped within the grace period
    Completed,
    /// The grace period ran out first
    TimedOut,
}

impl ShutdownOutcome {
    /// Process exit status for this outcome
    pub fn exit_code(self) -> i32 {
        match self {
            ShutdownOutcome::Completed => 0,
            ShutdownOutcome::TimedOut => 1,
        }
    }
}

/// Waits for a termination signal.
///
/// Returns `Ok(())` when any signal is received, or `Err` if signal registration fails.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

/// Waits for a termination signal.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// Cancel `token`, close every subscriber, then wait for `pending` for at
/// most `grace`.
///
/// `pending` should resolve once the server and capture tasks have stopped.
pub async fn graceful_shutdown<F>(
    token: &CancellationToken,
    hub: &RelayHub,
    pending: F,
    grace: Duration,
) -> ShutdownOutcome
where
    F: Future<Output = ()>,
{
    let deadline = tokio::time::Instant::now() + grace;
    tracing::info!("Shutting down relay (grace period {:?})", grace);

    token.cancel();

    let orderly = async {
        hub.close_all().await;
        pending.await;
    };

    match tokio::time::timeout_at(deadline, orderly).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ShutdownOutcome::Completed
        }
        Err(_) => {
            tracing::error!("Shutdown did not finish within {:?}, forcing exit", grace);
            ShutdownOutcome::TimedOut
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::HubConfig;
    use tokio::sync::mpsc;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ShutdownOutcome::Completed.exit_code(), 0);
        assert_eq!(ShutdownOutcome::TimedOut.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_graceful_shutdown_completes() {
        let hub = RelayHub::new(HubConfig::default());
        let (tx, mut rx) = mpsc::channel(4);
        hub.register(tx).await.unwrap();

        let token = CancellationToken::new();
        let watcher = token.clone();
        let outcome = graceful_shutdown(
            &token,
            &hub,
            async move { watcher.cancelled().await },
            Duration::from_secs(2),
        )
        .await;

        assert_eq!(outcome, ShutdownOutcome::Completed);
        assert!(token.is_cancelled());
        assert_eq!(hub.connection_count().await, 0);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_graceful_shutdown_times_out() {
        let hub = RelayHub::new(HubConfig::default());
        let token = CancellationToken::new();

        let started = std::time::Instant::now();
        let outcome = graceful_shutdown(
            &token,
            &hub,
            std::future::pending::<()>(),
            Duration::from_millis(50),
        )
        .await;

        assert_eq!(outcome, ShutdownOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
