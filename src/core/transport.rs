// src/core/transport.rs

//! The seam to the transport layer that exports remote endpoints.

use uuid::Uuid;

/// Withdraws remote endpoints from the transport layer.
///
/// The registry unexports its own endpoint at shutdown and every session
/// unexports its endpoint on disconnect. How endpoints are published in the
/// first place is the transport's business.
pub trait EndpointExporter: Send + Sync {
    fn unexport(&self, endpoint_id: Uuid);
}

/// Exporter used when the registry runs without a remote transport, e.g. in
/// tests or embedded setups.
#[derive(Debug, Default)]
pub struct NoopExporter;

impl EndpointExporter for NoopExporter {
    fn unexport(&self, _endpoint_id: Uuid) {}
}
