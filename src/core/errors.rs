// src/core/errors.rs

//! Defines the primary error type for the entire server.

use strum_macros::EnumDiscriminants;
use thiserror::Error;

/// The main error enum, representing all possible failures within the server.
/// Using `thiserror` keeps the definitions clean; the derived [`ErrorKind`]
/// discriminant is what configuration refers to when naming expected errors.
#[derive(Error, Debug, Clone, PartialEq, EnumDiscriminants)]
#[strum_discriminants(name(ErrorKind))]
#[strum_discriminants(derive(Hash, strum_macros::Display, strum_macros::EnumString))]
#[strum_discriminants(strum(serialize_all = "kebab-case"))]
pub enum PeridotError {
    #[error("Missing required connection field '{0}'")]
    MissingField(&'static str),

    #[error("Wrong username or password")]
    Authentication,

    #[error("Connection rejected: {0}")]
    ValidationRejected(String),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("The server is not accepting connections")]
    ServerFull,

    #[error("Server is shutting down")]
    ShuttingDown,

    #[error("A shared login proxy may only be registered once")]
    SharedProxyAlreadyRegistered,

    #[error("A login proxy is already registered for client type '{0}'")]
    ProxyAlreadyRegistered(String),

    #[error("A connection validator is already registered for client type '{0}'")]
    ValidatorAlreadyRegistered(String),

    #[error("Session is disconnected")]
    SessionDisconnected,

    #[error("No backing resource available from the pool")]
    PoolExhausted,

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Failed to open backing resource: {0}")]
    ResourceOpen(String),

    #[error("Resource call failed: {0}")]
    Call(String),

    #[error(transparent)]
    Wrapped(Box<PeridotError>),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl PeridotError {
    /// The discriminant of this error, used against the configured
    /// expected-error allow-list.
    pub fn kind(&self) -> ErrorKind {
        self.into()
    }

    /// Removes one level of wrapping added by a resource adapter, leaving
    /// other errors untouched.
    pub fn unwrap_wrapped(self) -> Self {
        match self {
            PeridotError::Wrapped(inner) => *inner,
            other => other,
        }
    }
}
