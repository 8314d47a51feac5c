//! Runtime - graceful shutdown for the HTTP transport

use std::sync::Arc;
use tokio::sync::watch;

/// Shutdown latch. Listeners that arrive after the trigger still see it.
#[derive(Clone)]
pub struct Shutdown {
    sender: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self { Self::new() }
}

impl Shutdown {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender: Arc::new(sender) }
    }

    /// Fires the latch. Repeated calls are no-ops.
    pub fn trigger(&self) {
        if !self.sender.send_replace(true) {
            tracing::debug!("Shutdown triggered");
        }
    }

    /// Resolves once `trigger` has been called on any clone.
    pub async fn triggered(&self) {
        let mut rx = self.sender.subscribe();
        // The sender lives in `self`, so the wait only ends on `true`.
        let _ = rx.wait_for(|fired| *fired).await;
    }
}

/// Install signal handlers and return shutdown handle
pub fn install_signal_handlers() -> Shutdown {
    let shutdown = Shutdown::new();
    let handle = shutdown.clone();

    tokio::spawn(async move {
        wait_for_signal().await;
        handle.trigger();
    });

    shutdown
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Signal handlers unavailable; falling back to Ctrl+C");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() { ctrl_c().await; }

async fn ctrl_c() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C"),
        Err(e) => tracing::error!(error = %e, "Ctrl+C handler failed"),
    }
}
