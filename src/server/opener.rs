// src/server/opener.rs

//! The registry's hook for opening and closing sessions.

use crate::connection::{RemoteConnectionSession, SessionEnv};
use crate::core::client::RemoteClient;
use crate::core::errors::PeridotError;
use crate::core::resource::{ConnectionPool, ResourceFactory};
use async_trait::async_trait;
use std::sync::Arc;

/// Opens the real backing resource behind a session and tears sessions down
/// again. The registry drives it; implementations decide what a session is
/// backed by.
#[async_trait]
pub trait SessionOpener: Send + Sync {
    /// Opens a session for an authenticated client. On error nothing may be
    /// left allocated for the client.
    async fn open_session(
        &self,
        client: RemoteClient,
        env: SessionEnv,
    ) -> Result<Arc<RemoteConnectionSession>, PeridotError>;

    /// Closes a session removed from the registry.
    async fn close_session(&self, session: &RemoteConnectionSession) {
        session.disconnect().await;
    }

    /// Invoked once at the end of registry shutdown.
    async fn on_shutdown(&self) {}
}

enum OpenerMode {
    Pooled(Arc<dyn ConnectionPool>),
    Local(Arc<dyn ResourceFactory>),
}

/// The standard opener: pooled sessions when constructed with a pool,
/// dedicated-resource sessions when constructed with a factory.
pub struct StandardSessionOpener {
    mode: OpenerMode,
}

impl StandardSessionOpener {
    pub fn pooled(pool: Arc<dyn ConnectionPool>) -> Self {
        Self {
            mode: OpenerMode::Pooled(pool),
        }
    }

    pub fn local(factory: Arc<dyn ResourceFactory>) -> Self {
        Self {
            mode: OpenerMode::Local(factory),
        }
    }
}

#[async_trait]
impl SessionOpener for StandardSessionOpener {
    async fn open_session(
        &self,
        client: RemoteClient,
        env: SessionEnv,
    ) -> Result<Arc<RemoteConnectionSession>, PeridotError> {
        match &self.mode {
            OpenerMode::Pooled(pool) => {
                RemoteConnectionSession::open_pooled(client, pool.clone(), env).await
            }
            OpenerMode::Local(factory) => {
                RemoteConnectionSession::open_local(client, factory.clone(), env).await
            }
        }
    }
}
