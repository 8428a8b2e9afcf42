// src/connection/interceptor.rs

//! The ordered interceptor chain a session runs around every forwarded call.
//!
//! Each cross-cutting concern gets one interceptor. Entry hooks run in chain
//! order before the resource is acquired; exit hooks run in the same order
//! after it is released, exactly once per call regardless of outcome.

use crate::connection::log::CallLog;
use crate::core::errors::PeridotError;
use crate::core::stats::{ActiveSessionRegistry, RequestRateCounter};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Describes one in-flight session call.
pub struct CallContext<'a> {
    pub client_id: Uuid,
    pub method: &'a str,
    pub args: &'a [Bytes],
}

/// The outcome of one session call.
pub struct CallOutcome<'a> {
    pub duration: Duration,
    pub error: Option<&'a PeridotError>,
}

pub trait CallInterceptor: Send + Sync {
    fn on_entry(&self, cx: &CallContext<'_>);
    fn on_exit(&self, cx: &CallContext<'_>, outcome: &CallOutcome<'_>);
}

/// Marks the session active for the duration of a call.
pub struct ActivityInterceptor {
    active: Arc<ActiveSessionRegistry>,
}

impl ActivityInterceptor {
    pub fn new(active: Arc<ActiveSessionRegistry>) -> Self {
        Self { active }
    }
}

impl CallInterceptor for ActivityInterceptor {
    fn on_entry(&self, cx: &CallContext<'_>) {
        self.active.enter(cx.client_id);
    }

    fn on_exit(&self, cx: &CallContext<'_>, _outcome: &CallOutcome<'_>) {
        self.active.exit(cx.client_id);
    }
}

/// Feeds the server-wide request rate counter.
pub struct MetricsInterceptor {
    rate: Arc<RequestRateCounter>,
}

impl MetricsInterceptor {
    pub fn new(rate: Arc<RequestRateCounter>) -> Self {
        Self { rate }
    }
}

impl CallInterceptor for MetricsInterceptor {
    fn on_entry(&self, _cx: &CallContext<'_>) {
        self.rate.record();
    }

    fn on_exit(&self, _cx: &CallContext<'_>, _outcome: &CallOutcome<'_>) {}
}

/// Records call entry and exit in the session's call log.
pub struct CallLogInterceptor {
    log: Arc<CallLog>,
}

impl CallLogInterceptor {
    pub fn new(log: Arc<CallLog>) -> Self {
        Self { log }
    }
}

impl CallInterceptor for CallLogInterceptor {
    fn on_entry(&self, cx: &CallContext<'_>) {
        if self.log.is_enabled() {
            debug!(client_id = %cx.client_id, method = cx.method, "call entry");
            self.log.log_entry(cx.method, cx.args);
        }
    }

    fn on_exit(&self, cx: &CallContext<'_>, outcome: &CallOutcome<'_>) {
        if self.log.is_enabled() {
            debug!(
                client_id = %cx.client_id,
                method = cx.method,
                duration_ms = outcome.duration.as_millis() as u64,
                success = outcome.error.is_none(),
                "call exit"
            );
            self.log
                .log_exit(outcome.duration, outcome.error.map(|e| e.to_string()));
        }
    }
}
