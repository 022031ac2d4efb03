//! Sender task: one gateway call at a time, results handed back to the worker.

use std::sync::Arc;
use std::time::Instant;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use courier_common::error::GatewayError;
use courier_common::types::{Request, Response};

use crate::gateway::GatewayClient;
use crate::queue::{BoundedQueue, TryPutError};
use crate::stats::Stats;

/// Outcome of one send attempt.
///
/// This is also the document piped to the error hook, so the serialized
/// field names are part of the hook protocol.
#[derive(Debug, Clone, Serialize)]
pub struct SendResult {
    pub response: Option<Response>,
    /// Gateway latency in seconds.
    pub response_time: f64,
    pub request: Request,
    #[serde(rename = "error_msg", serialize_with = "serialize_error")]
    pub error: Option<GatewayError>,
    #[serde(rename = "resp_uid")]
    pub uid: Uuid,
}

impl SendResult {
    /// Split a gateway outcome into its response and error parts.
    pub fn new(
        request: Request,
        outcome: Result<Response, GatewayError>,
        elapsed_secs: f64,
    ) -> Self {
        let (response, error) = match outcome {
            Ok(response) => (Some(response), None),
            Err(err) => (err.response().cloned(), Some(err)),
        };

        Self {
            response,
            response_time: elapsed_secs,
            request,
            error,
            uid: Uuid::new_v4(),
        }
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<GatewayError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(err) => serializer.serialize_str(&err.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Take requests until the queue is closed and drained.
///
/// The result push never waits: when the result queue is full the outcome is
/// dropped, including any retry or hook it would have triggered.
pub async fn run_sender(
    worker_id: usize,
    sender_id: usize,
    client: Arc<dyn GatewayClient>,
    requests: BoundedQueue<Request>,
    results: BoundedQueue<SendResult>,
    stats: Arc<Stats>,
) {
    stats.sender_started();
    tracing::debug!(worker_id, sender_id, "Sender started");

    while let Some(request) = requests.take().await {
        let start = Instant::now();
        let outcome = client.send(&request).await;
        let elapsed = start.elapsed().as_secs_f64();

        let result = SendResult::new(request, outcome, elapsed);
        match results.try_put(result) {
            Ok(()) => {
                tracing::debug!(
                    worker_id,
                    sender_id,
                    resp_queue_size = results.len(),
                    "Enqueued response"
                );
            }
            Err(TryPutError::Full(dropped)) => {
                stats.record_dropped();
                tracing::warn!(
                    worker_id,
                    sender_id,
                    token = %dropped.request.token,
                    resp_uid = %dropped.uid,
                    resp_queue_size = results.len(),
                    "Response queue is full, dropping result"
                );
            }
            Err(TryPutError::Closed(dropped)) => {
                stats.record_dropped();
                tracing::warn!(
                    worker_id,
                    sender_id,
                    resp_uid = %dropped.uid,
                    "Response queue is closed, dropping result"
                );
            }
        }
    }

    stats.sender_stopped();
    tracing::debug!(worker_id, sender_id, "Sender stopped");
}
