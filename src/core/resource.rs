// src/core/resource.rs

//! Contracts for the backing resources sessions forward their calls to, and
//! for the pool that lends them out.

use crate::core::client::RemoteClient;
use crate::core::errors::PeridotError;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// A single method invocation forwarded to a session's backing resource.
///
/// The wire encoding of method names and arguments is owned by the transport
/// layer; at this level both are opaque.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<Bytes>,
}

impl MethodCall {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Bytes>) -> Self {
        self.args = args;
        self
    }
}

/// The real downstream connection a session ultimately forwards calls to.
#[async_trait]
pub trait BackingResource: Send + Sync {
    /// Executes one forwarded call.
    async fn execute(&self, call: &MethodCall) -> Result<Bytes, PeridotError>;

    /// True while a transaction is open on this resource.
    fn is_transaction_open(&self) -> bool;

    /// Rolls back the open transaction.
    async fn rollback_transaction(&self) -> Result<(), PeridotError>;

    /// True while this resource considers itself usable.
    fn is_connected(&self) -> bool;

    /// Closes this resource.
    async fn disconnect(&self);
}

/// Opens dedicated backing resources for local-mode sessions.
#[async_trait]
pub trait ResourceFactory: Send + Sync {
    async fn open(&self, client: &RemoteClient) -> Result<Arc<dyn BackingResource>, PeridotError>;
}

/// A snapshot of pool counters, passed through the admin surface unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub size: usize,
    pub in_use: usize,
    pub created: usize,
}

/// The shared pool pooled-mode sessions check resources out of.
///
/// Checkout waiting and sizing are the pool's own concern; exhaustion is
/// reported as [`PeridotError::PoolExhausted`].
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    async fn checkout(&self) -> Result<Arc<dyn BackingResource>, PeridotError>;

    async fn give_back(&self, resource: Arc<dyn BackingResource>) -> Result<(), PeridotError>;

    fn statistics(&self) -> PoolStats;
}
