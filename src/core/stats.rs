// src/core/stats.rs

//! Server-wide activity tracking: the set of sessions currently serving a
//! call and the request rate counter.

use dashmap::DashSet;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::info;
use uuid::Uuid;

/// The set of client ids whose sessions are currently inside a call.
///
/// Exposed for observability only; dispatch never consults it. One instance
/// per server, so independent servers in one process do not share counts.
#[derive(Debug, Default)]
pub struct ActiveSessionRegistry {
    active: DashSet<Uuid>,
}

impl ActiveSessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self, client_id: Uuid) {
        self.active.insert(client_id);
    }

    pub fn exit(&self, client_id: Uuid) {
        self.active.remove(&client_id);
    }

    pub fn is_active(&self, client_id: Uuid) -> bool {
        self.active.contains(&client_id)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

/// Counts forwarded calls and periodically folds them into a requests-per-second
/// figure.
///
/// The published rate is whatever the last tick computed; reads between ticks
/// are intentionally stale rather than recomputed.
#[derive(Debug)]
pub struct RequestRateCounter {
    hits: AtomicU64,
    rate: AtomicU64,
    last_tick: Mutex<Instant>,
}

impl Default for RequestRateCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestRateCounter {
    pub fn new() -> Self {
        Self {
            hits: AtomicU64::new(0),
            rate: AtomicU64::new(0),
            last_tick: Mutex::new(Instant::now()),
        }
    }

    /// Records one forwarded call.
    pub fn record(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// The rate computed by the most recent tick.
    pub fn requests_per_second(&self) -> u64 {
        self.rate.load(Ordering::Relaxed)
    }

    fn update(&self) {
        let now = Instant::now();
        let mut last_tick = self.last_tick.lock();
        let seconds = now.duration_since(*last_tick).as_secs_f64();
        if seconds > 0.0 {
            let hits = self.hits.swap(0, Ordering::Relaxed);
            self.rate
                .store((hits as f64 / seconds).round() as u64, Ordering::Relaxed);
            *last_tick = now;
        }
    }

    /// Runs the periodic tick loop until the shutdown signal arrives.
    pub async fn run(self: Arc<Self>, period: Duration, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.update();
                }
                _ = shutdown_rx.recv() => {
                    info!("Request rate counter shutting down.");
                    return;
                }
            }
        }
    }
}
