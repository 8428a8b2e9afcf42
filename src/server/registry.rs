// src/server/registry.rs

//! The top-level connection registry: client registration, login-proxy
//! chaining, connection-limit enforcement and shutdown.

use crate::config::ServerConfig;
use crate::connection::{ClientLog, RemoteConnectionSession, SessionEnv};
use crate::core::auth::{ConnectionValidator, LoginProxy};
use crate::core::client::{CLIENT_HOST_PARAMETER, ConnectionRequest, RemoteClient, ServerInfo, User};
use crate::core::errors::{ErrorKind, PeridotError};
use crate::core::resource::{ConnectionPool, PoolStats};
use crate::core::stats::{ActiveSessionRegistry, RequestRateCounter};
use crate::core::transport::EndpointExporter;
use crate::server::opener::SessionOpener;
use crate::server::reaper::IdleSessionReaper;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// The registry's lifecycle. Construction is atomic, so a registry is
/// `Running` from the moment `new` returns; `Stopped` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    ShuttingDown,
    Stopped,
}

const RUNNING: u8 = 0;
const SHUTTING_DOWN: u8 = 1;
const STOPPED: u8 = 2;

/// One registered client: its identity and its session.
struct ConnectionEntry {
    client: RemoteClient,
    session: Arc<RemoteConnectionSession>,
}

/// The top-level server object.
///
/// Connect and disconnect for the same client id are linearized by the entry
/// mutex; the proxy and validator registrations live behind their own locks
/// so unrelated clients never serialize on them.
pub struct ConnectionRegistry {
    info: ServerInfo,
    config: ServerConfig,
    lifecycle: AtomicU8,
    connection_limit: AtomicI64,
    // Held across the login chain and resource open on purpose: connects for
    // the same client id must observe each other.
    entries: tokio::sync::Mutex<HashMap<Uuid, ConnectionEntry>>,
    shared_proxies: Mutex<Vec<Arc<dyn LoginProxy>>>,
    typed_proxies: Mutex<HashMap<String, Arc<dyn LoginProxy>>>,
    validators: Mutex<HashMap<String, Arc<dyn ConnectionValidator>>>,
    opener: Arc<dyn SessionOpener>,
    pool: Option<Arc<dyn ConnectionPool>>,
    exporter: Arc<dyn EndpointExporter>,
    active: Arc<ActiveSessionRegistry>,
    rate: Arc<RequestRateCounter>,
    expected_errors: HashSet<ErrorKind>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ConnectionRegistry {
    /// Creates a running registry and spawns its background tasks. Must be
    /// called from within a tokio runtime.
    pub fn new(
        config: ServerConfig,
        opener: Arc<dyn SessionOpener>,
        pool: Option<Arc<dyn ConnectionPool>>,
        exporter: Arc<dyn EndpointExporter>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        let rate = Arc::new(RequestRateCounter::new());
        let registry = Arc::new(Self {
            info: ServerInfo::new(config.server_name.clone(), config.port),
            lifecycle: AtomicU8::new(RUNNING),
            connection_limit: AtomicI64::new(config.connection_limit),
            entries: tokio::sync::Mutex::new(HashMap::new()),
            shared_proxies: Mutex::new(Vec::new()),
            typed_proxies: Mutex::new(HashMap::new()),
            validators: Mutex::new(HashMap::new()),
            opener,
            pool,
            exporter,
            active: Arc::new(ActiveSessionRegistry::new()),
            rate: rate.clone(),
            expected_errors: config.expected_error_kinds(),
            shutdown_tx: shutdown_tx.clone(),
            config,
        });
        tokio::spawn(rate.run(
            registry.config.request_counter_interval,
            shutdown_tx.subscribe(),
        ));
        tokio::spawn(
            IdleSessionReaper::new(registry.clone()).run(
                registry.config.maintenance_interval,
                shutdown_tx.subscribe(),
            ),
        );
        info!(
            "Server '{}' ({}) accepting connections on port {}",
            registry.info.server_name, registry.info.server_id, registry.info.port
        );
        registry
    }

    pub fn server_info(&self) -> &ServerInfo {
        &self.info
    }

    pub fn lifecycle(&self) -> Lifecycle {
        match self.lifecycle.load(Ordering::SeqCst) {
            RUNNING => Lifecycle::Running,
            SHUTTING_DOWN => Lifecycle::ShuttingDown,
            _ => Lifecycle::Stopped,
        }
    }

    /// Current requests per second across all sessions.
    pub fn server_load(&self) -> u64 {
        self.rate.requests_per_second()
    }

    /// Number of sessions currently inside a call.
    pub fn active_session_count(&self) -> usize {
        self.active.len()
    }

    pub async fn connection_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Negative means no limit, zero means the server is closed.
    pub fn connection_limit(&self) -> i64 {
        self.connection_limit.load(Ordering::SeqCst)
    }

    pub fn set_connection_limit(&self, limit: i64) {
        self.connection_limit.store(limit, Ordering::SeqCst);
    }

    pub async fn connections_available(&self) -> bool {
        !self.limit_reached(self.entries.lock().await.len())
    }

    fn limit_reached(&self, count: usize) -> bool {
        let limit = self.connection_limit();
        limit >= 0 && count as i64 >= limit
    }

    /// Connects a client, returning its session.
    ///
    /// Reconnecting with the client id of a live entry returns the existing
    /// session after a credential check; everything else builds a fresh one
    /// through the validator, the login-proxy chain and the session opener.
    pub async fn connect(
        &self,
        request: ConnectionRequest,
        peer_addr: Option<SocketAddr>,
    ) -> Result<Arc<RemoteConnectionSession>, PeridotError> {
        if self.lifecycle() != Lifecycle::Running {
            return Err(PeridotError::ShuttingDown);
        }
        validate_request(&request)?;

        let validator = self.validators.lock().get(request.client_type_id()).cloned();
        if let Some(validator) = validator {
            validator.validate(&request).await?;
        }

        let mut entries = self.entries.lock().await;
        if let Some(entry) = entries.get(&request.client_id()) {
            verify_credentials(request.user(), entry.client.backing_user())?;
            debug!("Active connection exists for {request}");
            return Ok(entry.session.clone());
        }

        if self.limit_reached(entries.len()) {
            return Err(PeridotError::ServerFull);
        }

        debug!("No active connection found for {request}, establishing a new one");
        let mut client = RemoteClient::from_request(request);
        let host = client
            .request()
            .parameter(CLIENT_HOST_PARAMETER)
            .map(str::to_string)
            .or_else(|| peer_addr.map(|addr| addr.ip().to_string()));
        client.set_client_host(host);

        let shared: Vec<_> = self.shared_proxies.lock().clone();
        for proxy in shared {
            client = proxy.do_login(client).await?;
        }
        let typed = self.typed_proxies.lock().get(client.client_type_id()).cloned();
        if let Some(proxy) = typed {
            client = proxy.do_login(client).await?;
        }

        let session = self
            .opener
            .open_session(client.clone(), self.session_env())
            .await?;
        entries.insert(
            client.client_id(),
            ConnectionEntry {
                client,
                session: session.clone(),
            },
        );

        Ok(session)
    }

    /// Disconnects the given client. A `None` or unknown id is a no-op, as is
    /// a repeated disconnect.
    pub async fn disconnect(&self, client_id: Option<Uuid>) -> Result<(), PeridotError> {
        let Some(client_id) = client_id else {
            return Ok(());
        };
        let removed = self.entries.lock().await.remove(&client_id);
        let Some(entry) = removed else {
            return Ok(());
        };

        self.opener.close_session(&entry.session).await;
        let shared: Vec<_> = self.shared_proxies.lock().clone();
        for proxy in shared {
            proxy.do_logout(&entry.client).await?;
        }
        let typed = self
            .typed_proxies
            .lock()
            .get(entry.client.client_type_id())
            .cloned();
        if let Some(proxy) = typed {
            proxy.do_logout(&entry.client).await?;
        }
        debug!("Client disconnected: {}", entry.client);

        Ok(())
    }

    /// Registers a proxy applied to every client, after those registered
    /// before it. The same instance may only be registered once.
    pub fn add_shared_login_proxy(&self, proxy: Arc<dyn LoginProxy>) -> Result<(), PeridotError> {
        let mut shared = self.shared_proxies.lock();
        if shared.iter().any(|existing| Arc::ptr_eq(existing, &proxy)) {
            return Err(PeridotError::SharedProxyAlreadyRegistered);
        }
        shared.push(proxy);
        Ok(())
    }

    /// Registers or clears the per-type proxy for `client_type_id`. An
    /// existing registration must be cleared first; clearing closes it.
    pub async fn set_login_proxy(
        &self,
        client_type_id: &str,
        proxy: Option<Arc<dyn LoginProxy>>,
    ) -> Result<(), PeridotError> {
        match proxy {
            Some(proxy) => {
                let mut typed = self.typed_proxies.lock();
                if typed.contains_key(client_type_id) {
                    return Err(PeridotError::ProxyAlreadyRegistered(
                        client_type_id.to_string(),
                    ));
                }
                typed.insert(client_type_id.to_string(), proxy);
                Ok(())
            }
            None => {
                let removed = self.typed_proxies.lock().remove(client_type_id);
                if let Some(proxy) = removed {
                    close_proxy(proxy).await;
                }
                Ok(())
            }
        }
    }

    /// Registers or clears the validator for `client_type_id`. An existing
    /// registration must be cleared first.
    pub fn set_connection_validator(
        &self,
        client_type_id: &str,
        validator: Option<Arc<dyn ConnectionValidator>>,
    ) -> Result<(), PeridotError> {
        let mut validators = self.validators.lock();
        match validator {
            Some(validator) => {
                if validators.contains_key(client_type_id) {
                    return Err(PeridotError::ValidatorAlreadyRegistered(
                        client_type_id.to_string(),
                    ));
                }
                validators.insert(client_type_id.to_string(), validator);
                Ok(())
            }
            None => {
                validators.remove(client_type_id);
                Ok(())
            }
        }
    }

    /// Shuts the server down: stops accepting connects, disconnects every
    /// client, closes every proxy and stops the background tasks. Teardown is
    /// best-effort; per-step failures are logged and never abort it.
    pub async fn shutdown(&self) {
        if self
            .lifecycle
            .compare_exchange(RUNNING, SHUTTING_DOWN, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        info!("Server '{}' shutting down", self.info.server_name);
        self.exporter.unexport(self.info.server_id);

        let client_ids: Vec<Uuid> = self.entries.lock().await.keys().copied().collect();
        for client_id in client_ids {
            if let Err(err) = self.disconnect(Some(client_id)).await {
                warn!("Error disconnecting client {client_id} on shutdown: {err}");
            }
        }

        let shared: Vec<_> = {
            let mut proxies = self.shared_proxies.lock();
            proxies.drain(..).collect()
        };
        for proxy in shared {
            close_proxy(proxy).await;
        }
        let typed: Vec<_> = {
            let mut proxies = self.typed_proxies.lock();
            proxies.drain().map(|(_, proxy)| proxy).collect()
        };
        for proxy in typed {
            close_proxy(proxy).await;
        }

        let _ = self.shutdown_tx.send(());
        self.opener.on_shutdown().await;
        self.lifecycle.store(STOPPED, Ordering::SeqCst);
        info!("Server '{}' stopped", self.info.server_name);
    }

    /// Identities of every registered client.
    pub async fn connected_clients(&self) -> Vec<RemoteClient> {
        self.entries
            .lock()
            .await
            .values()
            .map(|entry| entry.client.clone())
            .collect()
    }

    /// Registered clients connected as the given user.
    pub async fn clients_for_user(&self, username: &str) -> Vec<RemoteClient> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|entry| entry.client.user().username() == username)
            .map(|entry| entry.client.clone())
            .collect()
    }

    /// The call journal of the given client's session, if registered.
    pub async fn client_log(&self, client_id: Uuid) -> Option<ClientLog> {
        self.entries
            .lock()
            .await
            .get(&client_id)
            .map(|entry| entry.session.client_log())
    }

    /// Toggles call logging for the given client. Returns false when the
    /// client is not registered.
    pub async fn set_logging_enabled(&self, client_id: Uuid, enabled: bool) -> bool {
        match self.entries.lock().await.get(&client_id) {
            Some(entry) => {
                entry.session.set_logging_enabled(enabled);
                true
            }
            None => false,
        }
    }

    /// Pool counters, when this server runs in pooled mode.
    pub fn pool_statistics(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(|pool| pool.statistics())
    }

    /// Disconnects every registered client.
    pub async fn disconnect_all(&self) {
        let client_ids: Vec<Uuid> = self.entries.lock().await.keys().copied().collect();
        for client_id in client_ids {
            if let Err(err) = self.disconnect(Some(client_id)).await {
                warn!("Error disconnecting client {client_id}: {err}");
            }
        }
    }

    /// Disconnects every session idle past its client type's timeout and
    /// returns how many were removed.
    pub async fn disconnect_idle(&self) -> usize {
        let idle: Vec<Uuid> = self
            .entries
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| {
                let timeout = self.config.idle_timeout_for(entry.client.client_type_id());
                entry.session.has_been_inactive(timeout)
            })
            .map(|(client_id, _)| *client_id)
            .collect();
        let mut removed = 0;
        for client_id in idle {
            match self.disconnect(Some(client_id)).await {
                Ok(()) => removed += 1,
                Err(err) => warn!("Error disconnecting idle client {client_id}: {err}"),
            }
        }
        removed
    }

    fn session_env(&self) -> SessionEnv {
        SessionEnv::new(self.active.clone(), self.rate.clone(), self.exporter.clone())
            .with_logging(self.config.logging_enabled)
            .with_expected_errors(self.expected_errors.clone())
    }
}

fn validate_request(request: &ConnectionRequest) -> Result<(), PeridotError> {
    if request.user().username().is_empty() {
        return Err(PeridotError::MissingField("username"));
    }
    if request.user().password().is_empty() {
        return Err(PeridotError::MissingField("password"));
    }
    if request.client_id().is_nil() {
        return Err(PeridotError::MissingField("client_id"));
    }
    if request.client_type_id().is_empty() {
        return Err(PeridotError::MissingField("client_type_id"));
    }
    Ok(())
}

fn verify_credentials(offered: &User, required: &User) -> Result<(), PeridotError> {
    if offered.credentials_match(required) {
        Ok(())
    } else {
        Err(PeridotError::Authentication)
    }
}

async fn close_proxy(proxy: Arc<dyn LoginProxy>) {
    if let Err(err) = proxy.close().await {
        error!(
            "Error closing login proxy for client type '{}': {err}",
            proxy.client_type_id()
        );
    }
}
