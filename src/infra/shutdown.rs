//! Process-wide shutdown signal.

use tokio::sync::watch;
use tracing::{info, warn};

/// Fires the shutdown signal. Dropping the trigger also releases waiters.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Cloneable handle awaited by background loops and the server drain.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

pub fn channel() -> (ShutdownTrigger, Shutdown) {
    let (sender, receiver) = watch::channel(false);
    (ShutdownTrigger { sender }, Shutdown { receiver })
}

impl ShutdownTrigger {
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }
}

impl Shutdown {
    /// Resolve once shutdown has been requested.
    pub async fn wait(&mut self) {
        // An error means the trigger is gone, which counts as shutdown.
        let _ = self.receiver.wait_for(|triggered| *triggered).await;
    }
}

/// Wait for SIGINT or SIGTERM, then fire the trigger.
pub async fn wait_for_signal(trigger: ShutdownTrigger) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(
                target = "cache_stnsd::shutdown",
                error = %err,
                "failed to listen for SIGINT"
            );
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(
                    target = "cache_stnsd::shutdown",
                    error = %err,
                    "failed to listen for SIGTERM"
                );
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!(target = "cache_stnsd::shutdown", signal = "SIGINT", "shutdown requested"),
        _ = terminate => info!(target = "cache_stnsd::shutdown", signal = "SIGTERM", "shutdown requested"),
    }

    trigger.trigger();
}
