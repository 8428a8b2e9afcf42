// src/core/auth.rs

//! Pluggable login and validation capabilities applied during connect.

use crate::core::client::{ConnectionRequest, RemoteClient};
use crate::core::errors::PeridotError;
use async_trait::async_trait;

/// A stage that inspects or transforms client identity during connect and is
/// notified again on disconnect.
///
/// Shared proxies run for every client in registration order; a per-type proxy
/// runs after them, for its client type only. Each stage receives the client
/// by value and must hand back the (possibly modified) client or fail the
/// login outright.
#[async_trait]
pub trait LoginProxy: Send + Sync {
    /// The client type this proxy serves. Shared proxies may return `""`.
    fn client_type_id(&self) -> &str;

    /// Performs the login step for the given client.
    async fn do_login(&self, client: RemoteClient) -> Result<RemoteClient, PeridotError>;

    /// Notifies this proxy that the given client has logged out.
    async fn do_logout(&self, _client: &RemoteClient) -> Result<(), PeridotError> {
        Ok(())
    }

    /// Releases any resources held by this proxy. Called once, on removal or
    /// at server shutdown.
    async fn close(&self) -> Result<(), PeridotError> {
        Ok(())
    }
}

/// A pre-connect gate that can reject a connection request outright.
///
/// At most one validator is registered per client type; requests for types
/// without one are accepted.
#[async_trait]
pub trait ConnectionValidator: Send + Sync {
    /// The client type this validator serves.
    fn client_type_id(&self) -> &str;

    /// Accepts or rejects the given request.
    async fn validate(&self, request: &ConnectionRequest) -> Result<(), PeridotError>;
}
