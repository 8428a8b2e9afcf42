// src/server/reaper.rs

//! Background task disconnecting sessions idle past their timeout.

use crate::server::registry::ConnectionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::info;

/// Periodically sweeps the registry for idle sessions. The per-client-type
/// timeouts come from the registry's configuration.
pub struct IdleSessionReaper {
    registry: Arc<ConnectionRegistry>,
}

impl IdleSessionReaper {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Runs the sweep loop until the shutdown signal arrives.
    pub async fn run(self, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let removed = self.registry.disconnect_idle().await;
                    if removed > 0 {
                        info!("Disconnected {removed} idle sessions");
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Idle session reaper shutting down.");
                    return;
                }
            }
        }
    }
}
