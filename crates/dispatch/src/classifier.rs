//! Routes every send result to retry, give-up, handlers and the error hook.

use std::sync::Arc;

use courier_common::types::Request;

use crate::command::Command;
use crate::handler::Handlers;
use crate::queue::{BoundedQueue, TryPutError};
use crate::sender::SendResult;
use crate::stats::Stats;

/// What the classifier decided for one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Delivered,
    /// The gateway refused the request; it will never be resent.
    Rejected,
    /// Transport failure, request placed on the retry queue.
    Retried,
    /// Transport failure, retry queue was full.
    RetryDropped,
    /// Transport failure with the retry budget exhausted.
    GaveUp,
}

pub struct Classifier {
    handlers: Handlers,
    retry_queue: BoundedQueue<Request>,
    command_queue: BoundedQueue<Command>,
    stats: Arc<Stats>,
    max_retries: u32,
}

impl Classifier {
    pub fn new(
        handlers: Handlers,
        retry_queue: BoundedQueue<Request>,
        command_queue: BoundedQueue<Command>,
        stats: Arc<Stats>,
        max_retries: u32,
    ) -> Self {
        Self {
            handlers,
            retry_queue,
            command_queue,
            stats,
            max_retries,
        }
    }

    /// Classify one result. Never suspends: every queue push here is a
    /// try-put that drops on a full queue.
    pub fn classify(&self, worker_id: usize, mut result: SendResult) -> Verdict {
        let verdict = match (&result.error, &result.response) {
            (Some(err), Some(response)) => {
                self.stats.record_error();
                tracing::error!(
                    worker_id,
                    token = %result.request.token,
                    status = response.status_code,
                    apns_id = %response.apns_id,
                    resend_cnt = result.request.tries,
                    response_time = result.response_time,
                    resp_uid = %result.uid,
                    error = %err,
                    "Gateway rejected notification"
                );
                Verdict::Rejected
            }
            (Some(err), None) => {
                self.stats.record_error();
                tracing::warn!(
                    worker_id,
                    token = %result.request.token,
                    resend_cnt = result.request.tries,
                    resp_uid = %result.uid,
                    error = %err,
                    "No response from gateway"
                );
                self.schedule_retry(worker_id, &mut result.request)
            }
            (None, response) => {
                self.stats.record_sent();
                tracing::info!(
                    worker_id,
                    token = %result.request.token,
                    status = response.as_ref().map(|r| r.status_code),
                    apns_id = response.as_ref().map(|r| r.apns_id.as_str()),
                    resend_cnt = result.request.tries,
                    response_time = result.response_time,
                    resp_uid = %result.uid,
                    "Succeeded to send a notification"
                );
                Verdict::Delivered
            }
        };

        self.on_response(&result);
        verdict
    }

    fn schedule_retry(&self, worker_id: usize, request: &mut Request) -> Verdict {
        if request.tries >= self.max_retries {
            tracing::warn!(
                worker_id,
                token = %request.token,
                max_retries = self.max_retries,
                "Retry budget exhausted, could not deliver notification"
            );
            return Verdict::GaveUp;
        }

        request.tries += 1;
        self.stats.record_retry();

        match self.retry_queue.try_put(request.clone()) {
            Ok(()) => {
                tracing::debug!(
                    worker_id,
                    token = %request.token,
                    resend_cnt = request.tries,
                    "Enqueued into retry queue"
                );
                Verdict::Retried
            }
            Err(e) => {
                self.stats.record_dropped();
                tracing::warn!(
                    worker_id,
                    token = %request.token,
                    resend_cnt = request.tries,
                    closed = !e.is_full(),
                    "Retry queue is full, dropping retry"
                );
                Verdict::RetryDropped
            }
        }
    }

    /// Invoke the handler and, for terminal failures, queue the error hook.
    fn on_response(&self, result: &SendResult) {
        let request = &result.request;
        let response = result.response.as_ref();

        let Some(err) = result.error.as_ref() else {
            self.handlers.success.on_response(request, response, None);
            return;
        };
        self.handlers.error.on_response(request, response, Some(err));

        let hook = self.handlers.error.hook_command();
        if hook.is_empty() || response.is_none() {
            return;
        }

        let input = match serde_json::to_vec(result) {
            Ok(input) => input,
            Err(e) => {
                tracing::error!(token = %request.token, error = %e, "Failed to serialize result");
                return;
            }
        };

        let command = Command {
            command: hook.to_string(),
            input,
        };
        match self.command_queue.try_put(command) {
            Ok(()) => tracing::debug!(token = %request.token, "Enqueued hook command"),
            Err(TryPutError::Full(cmd)) | Err(TryPutError::Closed(cmd)) => {
                self.stats.record_dropped();
                tracing::warn!(
                    token = %request.token,
                    command = %cmd.command,
                    "Command queue is full, hook not executed"
                );
            }
        }
    }
}
