// src/connection/mod.rs

//! Manages the lifecycle of a single client session: call interception,
//! resource checkout and the per-session call journal.

mod interceptor;
mod log;
mod session;

pub use interceptor::{
    ActivityInterceptor, CallContext, CallInterceptor, CallLogInterceptor, CallOutcome,
    MetricsInterceptor,
};
pub use log::{CallLog, CallLogEntry, ClientLog};
pub use session::{DisconnectListener, RemoteConnectionSession, SessionEnv};
