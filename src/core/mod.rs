// src/core/mod.rs

//! The central module containing the core contracts and data structures of Peridot.

pub mod auth;
pub mod client;
pub mod errors;
pub mod resource;
pub mod stats;
pub mod transport;

pub use client::{ConnectionRequest, RemoteClient, ServerInfo, User};
pub use errors::{ErrorKind, PeridotError};
pub use resource::MethodCall;
