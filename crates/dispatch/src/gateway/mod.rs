pub mod http;

use std::sync::Arc;

use async_trait::async_trait;

use courier_common::error::{AppError, GatewayError};
use courier_common::types::{Request, Response};

pub use http::{HttpConnector, HttpGateway};

/// One established connection to the push gateway.
///
/// Senders of the same worker share a client concurrently, so
/// implementations must be `Send + Sync`.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Deliver a single request.
    ///
    /// `Ok` is a successful delivery. `Err(GatewayError::Rejected)` carries
    /// the gateway reply of a terminal failure; `Err(GatewayError::Transport)`
    /// means no reply was received.
    async fn send(&self, request: &Request) -> Result<Response, GatewayError>;
}

/// Establishes gateway connections, one per worker, during startup.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, worker_id: usize) -> Result<Arc<dyn GatewayClient>, AppError>;
}
