// src/connection/log.rs

//! Bounded in-memory journal of a session's forwarded calls.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Oldest entries are dropped past this many.
const LOG_CAPACITY: usize = 256;

/// One recorded call. The duration and error are filled in on exit.
#[derive(Debug, Clone)]
pub struct CallLogEntry {
    pub method: String,
    pub args: String,
    pub entered_at: DateTime<Utc>,
    pub duration: Option<Duration>,
    pub error: Option<String>,
}

/// The call journal of a single session.
///
/// Recording is gated on the enabled flag, which the admin surface can toggle
/// at any time.
#[derive(Debug)]
pub struct CallLog {
    enabled: AtomicBool,
    entries: Mutex<VecDeque<CallLogEntry>>,
}

impl CallLog {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Records call entry.
    pub fn log_entry(&self, method: &str, args: &[Bytes]) {
        let rendered = args
            .iter()
            .map(|arg| String::from_utf8_lossy(arg).into_owned())
            .collect::<Vec<_>>()
            .join(", ");
        let mut entries = self.entries.lock();
        if entries.len() == LOG_CAPACITY {
            entries.pop_front();
        }
        entries.push_back(CallLogEntry {
            method: method.to_string(),
            args: rendered,
            entered_at: Utc::now(),
            duration: None,
            error: None,
        });
    }

    /// Completes the most recent open entry. Calls are serialized per session,
    /// so that entry is always the one this exit belongs to.
    pub fn log_exit(&self, duration: Duration, error: Option<String>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.iter_mut().rev().find(|e| e.duration.is_none()) {
            entry.duration = Some(duration);
            entry.error = error;
        }
    }

    pub fn snapshot(&self) -> Vec<CallLogEntry> {
        self.entries.lock().iter().cloned().collect()
    }
}

/// Snapshot of one session's activity, handed to the admin surface.
#[derive(Debug, Clone)]
pub struct ClientLog {
    pub client_id: Uuid,
    pub session_created_at: DateTime<Utc>,
    pub entries: Vec<CallLogEntry>,
}
