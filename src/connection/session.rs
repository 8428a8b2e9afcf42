// src/connection/session.rs

//! One authenticated client's server-side handle, multiplexing calls onto a
//! pooled or dedicated backing resource.

use crate::connection::interceptor::{
    ActivityInterceptor, CallContext, CallInterceptor, CallLogInterceptor, CallOutcome,
    MetricsInterceptor,
};
use crate::connection::log::{CallLog, ClientLog};
use crate::core::client::RemoteClient;
use crate::core::errors::{ErrorKind, PeridotError};
use crate::core::resource::{BackingResource, ConnectionPool, MethodCall, ResourceFactory};
use crate::core::stats::{ActiveSessionRegistry, RequestRateCounter};
use crate::core::transport::EndpointExporter;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// Server-side collaborators a session is wired to at construction.
#[derive(Clone)]
pub struct SessionEnv {
    pub active: Arc<ActiveSessionRegistry>,
    pub rate: Arc<RequestRateCounter>,
    pub exporter: Arc<dyn EndpointExporter>,
    pub logging_enabled: bool,
    pub expected_errors: HashSet<ErrorKind>,
}

impl SessionEnv {
    pub fn new(
        active: Arc<ActiveSessionRegistry>,
        rate: Arc<RequestRateCounter>,
        exporter: Arc<dyn EndpointExporter>,
    ) -> Self {
        Self {
            active,
            rate,
            exporter,
            logging_enabled: false,
            expected_errors: HashSet::new(),
        }
    }

    pub fn with_logging(mut self, enabled: bool) -> Self {
        self.logging_enabled = enabled;
        self
    }

    pub fn with_expected_errors(mut self, expected: HashSet<ErrorKind>) -> Self {
        self.expected_errors = expected;
        self
    }
}

/// Notified once when a session disconnects.
pub type DisconnectListener = Box<dyn Fn(&RemoteClient) + Send + Sync>;

/// Where a session's calls go: a shared pool or a dedicated resource.
///
/// `bound` / `resource` hold the checked-out resource only while a call or an
/// open transaction does; a session never holds more than one at a time.
enum Backing {
    Pooled {
        pool: Arc<dyn ConnectionPool>,
        bound: Option<Arc<dyn BackingResource>>,
    },
    Local {
        factory: Arc<dyn ResourceFactory>,
        resource: Option<Arc<dyn BackingResource>>,
    },
}

/// The per-client session.
///
/// Every forwarded call runs through [`RemoteConnectionSession::invoke`],
/// which serializes overlapping calls from the same client, runs the
/// interceptor chain and manages resource checkout around the call.
pub struct RemoteConnectionSession {
    client: RemoteClient,
    created_at: DateTime<Utc>,
    last_access: Mutex<Instant>,
    connected: AtomicBool,
    backing: tokio::sync::Mutex<Backing>,
    interceptors: Vec<Arc<dyn CallInterceptor>>,
    log: Arc<CallLog>,
    expected_errors: HashSet<ErrorKind>,
    exporter: Arc<dyn EndpointExporter>,
    disconnect_listeners: Mutex<Vec<DisconnectListener>>,
}

impl std::fmt::Debug for RemoteConnectionSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteConnectionSession")
            .field("client", &self.client)
            .field("created_at", &self.created_at)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RemoteConnectionSession {
    /// Opens a pooled-mode session: one resource is eagerly checked out to
    /// prove the pool serves this client, then returned immediately.
    pub async fn open_pooled(
        client: RemoteClient,
        pool: Arc<dyn ConnectionPool>,
        env: SessionEnv,
    ) -> Result<Arc<Self>, PeridotError> {
        let probe = pool.checkout().await?;
        if let Err(err) = pool.give_back(probe).await {
            warn!("Failed to return probe resource to pool: {err}");
        }
        Ok(Self::build(client, Backing::Pooled { pool, bound: None }, env))
    }

    /// Opens a local-mode session with a dedicated backing resource.
    pub async fn open_local(
        client: RemoteClient,
        factory: Arc<dyn ResourceFactory>,
        env: SessionEnv,
    ) -> Result<Arc<Self>, PeridotError> {
        let resource = factory.open(&client).await?;
        Ok(Self::build(
            client,
            Backing::Local {
                factory,
                resource: Some(resource),
            },
            env,
        ))
    }

    fn build(client: RemoteClient, backing: Backing, env: SessionEnv) -> Arc<Self> {
        let log = Arc::new(CallLog::new(env.logging_enabled));
        let interceptors: Vec<Arc<dyn CallInterceptor>> = vec![
            Arc::new(ActivityInterceptor::new(env.active)),
            Arc::new(MetricsInterceptor::new(env.rate)),
            Arc::new(CallLogInterceptor::new(log.clone())),
        ];
        Arc::new(Self {
            client,
            created_at: Utc::now(),
            last_access: Mutex::new(Instant::now()),
            connected: AtomicBool::new(true),
            backing: tokio::sync::Mutex::new(backing),
            interceptors,
            log,
            expected_errors: env.expected_errors,
            exporter: env.exporter,
            disconnect_listeners: Mutex::new(Vec::new()),
        })
    }

    pub fn client(&self) -> &RemoteClient {
        &self.client
    }

    pub fn client_id(&self) -> uuid::Uuid {
        self.client.client_id()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Forwards one call to the backing resource, wrapped by the interceptor
    /// chain and the checkout/return protocol.
    pub async fn invoke(&self, call: MethodCall) -> Result<Bytes, PeridotError> {
        // Overlapping calls from one client serialize here, never against the
        // bound resource.
        let mut backing = self.backing.lock().await;
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PeridotError::SessionDisconnected);
        }
        *self.last_access.lock() = Instant::now();

        let cx = CallContext {
            client_id: self.client.client_id(),
            method: &call.method,
            args: &call.args,
        };
        for interceptor in &self.interceptors {
            interceptor.on_entry(&cx);
        }

        let started = Instant::now();
        let result = self
            .forward(&mut backing, &call)
            .await
            .map_err(PeridotError::unwrap_wrapped);
        if let Err(err) = &result
            && !self.expected_errors.contains(&err.kind())
        {
            error!("Call '{}' failed for {}: {err}", call.method, self.client);
        }
        self.release(&mut backing).await;

        let outcome = CallOutcome {
            duration: started.elapsed(),
            error: result.as_ref().err(),
        };
        for interceptor in &self.interceptors {
            interceptor.on_exit(&cx, &outcome);
        }

        result
    }

    async fn forward(
        &self,
        backing: &mut Backing,
        call: &MethodCall,
    ) -> Result<Bytes, PeridotError> {
        let resource = self.acquire(backing).await?;
        resource.execute(call).await
    }

    /// Binds the resource this call runs against.
    async fn acquire(&self, backing: &mut Backing) -> Result<Arc<dyn BackingResource>, PeridotError> {
        match backing {
            Backing::Pooled { pool, bound } => {
                if let Some(resource) = bound.take() {
                    if resource.is_transaction_open() {
                        // Never double-checkout mid-transaction.
                        *bound = Some(resource.clone());
                        return Ok(resource);
                    }
                    // Stale binding without a transaction; hand it back first.
                    if let Err(err) = pool.give_back(resource).await {
                        warn!("Failed to return resource to pool: {err}");
                    }
                }
                let resource = pool.checkout().await?;
                *bound = Some(resource.clone());
                Ok(resource)
            }
            Backing::Local { factory, resource } => match resource {
                Some(current) if current.is_connected() => Ok(current.clone()),
                _ => {
                    if let Some(stale) = resource.take() {
                        stale.disconnect().await;
                    }
                    let fresh = factory.open(&self.client).await?;
                    *resource = Some(fresh.clone());
                    Ok(fresh)
                }
            },
        }
    }

    /// Unbinds after a call. A pooled resource stays bound while its
    /// transaction remains open; a local resource stays bound until disconnect.
    async fn release(&self, backing: &mut Backing) {
        if let Backing::Pooled { pool, bound } = backing {
            if bound.as_ref().is_some_and(|r| r.is_transaction_open()) {
                return;
            }
            if let Some(resource) = bound.take() {
                if let Err(err) = pool.give_back(resource).await {
                    warn!("Failed to return resource to pool: {err}");
                }
            }
        }
    }

    /// Disconnects this session. Idempotent; the disconnect notification
    /// fires exactly once.
    pub async fn disconnect(&self) {
        {
            let mut backing = self.backing.lock().await;
            if !self.connected.swap(false, Ordering::SeqCst) {
                return;
            }
            self.exporter.unexport(self.client.client_id());
            match &mut *backing {
                Backing::Pooled { pool, bound } => {
                    if let Some(resource) = bound.take() {
                        self.rollback_if_open(resource.as_ref()).await;
                        if let Err(err) = pool.give_back(resource).await {
                            warn!("Failed to return resource to pool on disconnect: {err}");
                        }
                    }
                }
                Backing::Local { resource, .. } => {
                    if let Some(resource) = resource.take() {
                        self.rollback_if_open(resource.as_ref()).await;
                        resource.disconnect().await;
                    }
                }
            }
        }
        for listener in self.disconnect_listeners.lock().iter() {
            listener(&self.client);
        }
    }

    async fn rollback_if_open(&self, resource: &dyn BackingResource) {
        if resource.is_transaction_open() {
            info!("Rollback open transaction on disconnect: {}", self.client);
            if let Err(err) = resource.rollback_transaction().await {
                warn!("Rollback on disconnect failed for {}: {err}", self.client);
            }
        }
    }

    /// Pooled mode reflects only the session flag; local mode also requires
    /// the dedicated resource to consider itself connected.
    pub async fn is_connected(&self) -> bool {
        let connected = self.connected.load(Ordering::SeqCst);
        match &*self.backing.lock().await {
            Backing::Pooled { .. } => connected,
            Backing::Local { resource, .. } => {
                connected && resource.as_ref().is_some_and(|r| r.is_connected())
            }
        }
    }

    /// True when no call has touched this session for longer than `timeout`.
    pub fn has_been_inactive(&self, timeout: Duration) -> bool {
        self.last_access.lock().elapsed() > timeout
    }

    pub fn is_logging_enabled(&self) -> bool {
        self.log.is_enabled()
    }

    pub fn set_logging_enabled(&self, enabled: bool) {
        self.log.set_enabled(enabled);
    }

    /// Snapshot of this session's recent activity.
    pub fn client_log(&self) -> ClientLog {
        ClientLog {
            client_id: self.client.client_id(),
            session_created_at: self.created_at,
            entries: self.log.snapshot(),
        }
    }

    pub fn add_disconnect_listener(&self, listener: DisconnectListener) {
        self.disconnect_listeners.lock().push(listener);
    }
}
