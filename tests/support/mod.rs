// tests/support/mod.rs

//! Shared mock collaborators for the test suite.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use peridot::config::ServerConfig;
use peridot::connection::SessionEnv;
use peridot::core::auth::{ConnectionValidator, LoginProxy};
use peridot::core::resource::{
    BackingResource, ConnectionPool, MethodCall, PoolStats, ResourceFactory,
};
use peridot::core::stats::{ActiveSessionRegistry, RequestRateCounter};
use peridot::core::transport::{EndpointExporter, NoopExporter};
use peridot::core::{ConnectionRequest, PeridotError, RemoteClient, User};
use peridot::server::{ConnectionRegistry, StandardSessionOpener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use uuid::Uuid;

pub fn user(username: &str) -> User {
    User::new(username, "secret")
}

pub fn request(client_type: &str) -> ConnectionRequest {
    ConnectionRequest::new(user("scott"), Uuid::new_v4(), client_type)
}

pub fn request_for(username: &str, client_type: &str) -> ConnectionRequest {
    ConnectionRequest::new(user(username), Uuid::new_v4(), client_type)
}

/// In-memory backing resource. Method names drive its behavior: "begin" and
/// "commit" toggle the transaction flag, "fail" and "fail-wrapped" error out,
/// anything else succeeds.
pub struct TestResource {
    pub id: usize,
    pub connected: AtomicBool,
    pub tx_open: AtomicBool,
    pub rollbacks: AtomicUsize,
    pub calls: Mutex<Vec<String>>,
    pub on_execute: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl TestResource {
    pub fn new(id: usize) -> Arc<Self> {
        Arc::new(Self {
            id,
            connected: AtomicBool::new(true),
            tx_open: AtomicBool::new(false),
            rollbacks: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
            on_execute: Mutex::new(None),
        })
    }
}

#[async_trait]
impl BackingResource for TestResource {
    async fn execute(&self, call: &MethodCall) -> Result<Bytes, PeridotError> {
        if let Some(hook) = self.on_execute.lock().as_ref() {
            hook();
        }
        self.calls.lock().push(call.method.clone());
        match call.method.as_str() {
            "begin" => {
                self.tx_open.store(true, Ordering::SeqCst);
                Ok(Bytes::from_static(b"ok"))
            }
            "commit" => {
                self.tx_open.store(false, Ordering::SeqCst);
                Ok(Bytes::from_static(b"ok"))
            }
            "fail" => Err(PeridotError::Call("boom".to_string())),
            "fail-wrapped" => Err(PeridotError::Wrapped(Box::new(PeridotError::Call(
                "inner".to_string(),
            )))),
            _ => Ok(Bytes::from_static(b"ok")),
        }
    }

    fn is_transaction_open(&self) -> bool {
        self.tx_open.load(Ordering::SeqCst)
    }

    async fn rollback_transaction(&self) -> Result<(), PeridotError> {
        self.tx_open.store(false, Ordering::SeqCst);
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// Factory for local-mode sessions; keeps every resource it opened.
#[derive(Default)]
pub struct TestFactory {
    pub fail: AtomicBool,
    pub opened: AtomicUsize,
    pub resources: Mutex<Vec<Arc<TestResource>>>,
}

impl TestFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last(&self) -> Arc<TestResource> {
        self.resources.lock().last().cloned().expect("no resource opened")
    }
}

#[async_trait]
impl ResourceFactory for TestFactory {
    async fn open(&self, _client: &RemoteClient) -> Result<Arc<dyn BackingResource>, PeridotError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PeridotError::ResourceOpen("told to fail".to_string()));
        }
        let id = self.opened.fetch_add(1, Ordering::SeqCst);
        let resource = TestResource::new(id);
        self.resources.lock().push(resource.clone());
        Ok(resource)
    }
}

/// Unbounded pool of [`TestResource`]s; keeps every resource it created.
#[derive(Default)]
pub struct TestPool {
    pub available: Mutex<Vec<Arc<dyn BackingResource>>>,
    pub all: Mutex<Vec<Arc<TestResource>>>,
    pub checkouts: AtomicUsize,
    pub returns: AtomicUsize,
    pub exhausted: AtomicBool,
    next_id: AtomicUsize,
}

impl TestPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn last(&self) -> Arc<TestResource> {
        self.all.lock().last().cloned().expect("pool created no resource")
    }
}

#[async_trait]
impl ConnectionPool for TestPool {
    async fn checkout(&self) -> Result<Arc<dyn BackingResource>, PeridotError> {
        if self.exhausted.load(Ordering::SeqCst) {
            return Err(PeridotError::PoolExhausted);
        }
        self.checkouts.fetch_add(1, Ordering::SeqCst);
        if let Some(resource) = self.available.lock().pop() {
            return Ok(resource);
        }
        let resource = TestResource::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.all.lock().push(resource.clone());
        Ok(resource)
    }

    async fn give_back(&self, resource: Arc<dyn BackingResource>) -> Result<(), PeridotError> {
        self.returns.fetch_add(1, Ordering::SeqCst);
        self.available.lock().push(resource);
        Ok(())
    }

    fn statistics(&self) -> PoolStats {
        PoolStats {
            size: self.available.lock().len(),
            in_use: self
                .checkouts
                .load(Ordering::SeqCst)
                .saturating_sub(self.returns.load(Ordering::SeqCst)),
            created: self.all.lock().len(),
        }
    }
}

/// Login proxy writing login/logout events into a shared journal.
pub struct RecordingProxy {
    pub name: String,
    pub client_type: String,
    pub journal: Arc<Mutex<Vec<String>>>,
    pub fail_login: AtomicBool,
    pub fail_logout: AtomicBool,
    pub fail_close: AtomicBool,
    pub closed: AtomicUsize,
    pub substitute_user: Mutex<Option<User>>,
}

impl RecordingProxy {
    fn build(name: &str, client_type: &str, journal: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            name: name.to_string(),
            client_type: client_type.to_string(),
            journal,
            fail_login: AtomicBool::new(false),
            fail_logout: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            closed: AtomicUsize::new(0),
            substitute_user: Mutex::new(None),
        }
    }

    pub fn new(name: &str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self::build(name, "", journal))
    }

    pub fn for_type(name: &str, client_type: &str, journal: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self::build(name, client_type, journal))
    }
}

#[async_trait]
impl LoginProxy for RecordingProxy {
    fn client_type_id(&self) -> &str {
        &self.client_type
    }

    async fn do_login(&self, mut client: RemoteClient) -> Result<RemoteClient, PeridotError> {
        self.journal.lock().push(format!("{}:login", self.name));
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(PeridotError::Login(format!("{} rejected", self.name)));
        }
        if let Some(user) = self.substitute_user.lock().clone() {
            client.set_backing_user(user);
        }
        Ok(client)
    }

    async fn do_logout(&self, _client: &RemoteClient) -> Result<(), PeridotError> {
        self.journal.lock().push(format!("{}:logout", self.name));
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(PeridotError::Login(format!("{} logout failed", self.name)));
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), PeridotError> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(PeridotError::Internal(format!("{} close failed", self.name)));
        }
        Ok(())
    }
}

/// Validator rejecting everything.
pub struct RejectingValidator {
    pub client_type: String,
}

impl RejectingValidator {
    pub fn new(client_type: &str) -> Arc<Self> {
        Arc::new(Self {
            client_type: client_type.to_string(),
        })
    }
}

#[async_trait]
impl ConnectionValidator for RejectingValidator {
    fn client_type_id(&self) -> &str {
        &self.client_type
    }

    async fn validate(&self, _request: &ConnectionRequest) -> Result<(), PeridotError> {
        Err(PeridotError::ValidationRejected(
            "rejected by test validator".to_string(),
        ))
    }
}

/// Exporter recording every unexported endpoint id.
#[derive(Default)]
pub struct RecordingExporter {
    pub unexported: Mutex<Vec<Uuid>>,
}

impl RecordingExporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl EndpointExporter for RecordingExporter {
    fn unexport(&self, endpoint_id: Uuid) {
        self.unexported.lock().push(endpoint_id);
    }
}

pub fn test_config() -> ServerConfig {
    ServerConfig::default()
}

pub fn session_env() -> SessionEnv {
    SessionEnv::new(
        Arc::new(ActiveSessionRegistry::new()),
        Arc::new(RequestRateCounter::new()),
        Arc::new(NoopExporter),
    )
}

pub fn pooled_registry(pool: Arc<TestPool>) -> Arc<ConnectionRegistry> {
    pooled_registry_cfg(test_config(), pool, Arc::new(NoopExporter))
}

pub fn pooled_registry_with_config(
    config: ServerConfig,
    pool: Arc<TestPool>,
) -> Arc<ConnectionRegistry> {
    pooled_registry_cfg(config, pool, Arc::new(NoopExporter))
}

pub fn pooled_registry_cfg(
    config: ServerConfig,
    pool: Arc<TestPool>,
    exporter: Arc<dyn EndpointExporter>,
) -> Arc<ConnectionRegistry> {
    ConnectionRegistry::new(
        config,
        Arc::new(StandardSessionOpener::pooled(pool.clone())),
        Some(pool),
        exporter,
    )
}

pub fn local_registry(factory: Arc<TestFactory>) -> Arc<ConnectionRegistry> {
    local_registry_cfg(test_config(), factory, Arc::new(NoopExporter))
}

pub fn local_registry_cfg(
    config: ServerConfig,
    factory: Arc<TestFactory>,
    exporter: Arc<dyn EndpointExporter>,
) -> Arc<ConnectionRegistry> {
    ConnectionRegistry::new(
        config,
        Arc::new(StandardSessionOpener::local(factory)),
        None,
        exporter,
    )
}
