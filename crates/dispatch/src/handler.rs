//! Outcome callbacks injected into the supervisor at startup.

use std::sync::Arc;

use courier_common::error::GatewayError;
use courier_common::types::{Request, Response};

/// Receives the outcome of every classified send.
///
/// Called synchronously from worker tasks, possibly from many at once.
pub trait ResponseHandler: Send + Sync {
    fn on_response(
        &self,
        request: &Request,
        response: Option<&Response>,
        error: Option<&GatewayError>,
    );

    /// Shell command run with the serialized result of terminal failures.
    /// Empty disables the hook.
    fn hook_command(&self) -> &str {
        ""
    }
}

/// The success and error handlers used by every worker.
#[derive(Clone)]
pub struct Handlers {
    pub success: Arc<dyn ResponseHandler>,
    pub error: Arc<dyn ResponseHandler>,
}

impl Handlers {
    pub fn new(success: Arc<dyn ResponseHandler>, error: Arc<dyn ResponseHandler>) -> Self {
        Self { success, error }
    }

    /// Log-only handlers, with an optional hook command for failures.
    pub fn logging(error_hook: Option<String>) -> Self {
        Self {
            success: Arc::new(LoggingHandler::default()),
            error: Arc::new(LoggingHandler::with_hook(error_hook.unwrap_or_default())),
        }
    }
}

impl Default for Handlers {
    fn default() -> Self {
        Self::logging(None)
    }
}

/// Handler that only emits a trace event per outcome.
#[derive(Debug, Default)]
pub struct LoggingHandler {
    hook: String,
}

impl LoggingHandler {
    pub fn with_hook(hook: impl Into<String>) -> Self {
        Self { hook: hook.into() }
    }
}

impl ResponseHandler for LoggingHandler {
    fn on_response(
        &self,
        request: &Request,
        response: Option<&Response>,
        error: Option<&GatewayError>,
    ) {
        match error {
            Some(err) => tracing::debug!(
                token = %request.token,
                status = response.map(|r| r.status_code),
                error = %err,
                "Notification failed"
            ),
            None => tracing::trace!(
                token = %request.token,
                apns_id = response.map(|r| r.apns_id.as_str()),
                "Notification delivered"
            ),
        }
    }

    fn hook_command(&self) -> &str {
        &self.hook
    }
}
