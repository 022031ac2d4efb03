use thiserror::Error;

use crate::types::{ErrorReason, Response};

/// Common error types used across the application.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Queue is full: {queue}")]
    QueueFull { queue: &'static str },

    #[error("Queue is closed: {queue}")]
    QueueClosed { queue: &'static str },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported for a single gateway send.
///
/// `Rejected` is terminal: the gateway answered and refused the notification,
/// so resending can never succeed. `Transport` means no answer was received
/// and the request is eligible for a bounded retry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{reason}")]
    Rejected {
        response: Response,
        reason: ErrorReason,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl GatewayError {
    /// The gateway reply carried by a terminal error.
    pub fn response(&self) -> Option<&Response> {
        match self {
            GatewayError::Rejected { response, .. } => Some(response),
            GatewayError::Transport(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&ErrorReason> {
        match self {
            GatewayError::Rejected { reason, .. } => Some(reason),
            GatewayError::Transport(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GatewayError::Rejected { .. })
    }
}
