// src/server/mod.rs

//! The top-level server: the connection registry, its session opener hook and
//! its background maintenance task.

mod opener;
mod reaper;
mod registry;

pub use opener::{SessionOpener, StandardSessionOpener};
pub use reaper::IdleSessionReaper;
pub use registry::{ConnectionRegistry, Lifecycle};
