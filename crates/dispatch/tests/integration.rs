//! End-to-end tests for the dispatch pipeline against an in-process gateway.
//!
//! Run with:
//!
//! ```bash
//! cargo test -p courier-dispatch --test integration
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use courier_common::config::{AppConfig, FlowConfig, RetryConfig, ShutdownConfig};
use courier_common::error::{AppError, GatewayError};
use courier_common::types::{Batch, ErrorReason, Request, Response};
use courier_dispatch::{
    Connector, DrainOutcome, GatewayClient, Handlers, ResponseHandler, Supervisor,
};

// ============================================================
// Shared helpers
// ============================================================

const GOOD_TOKEN: &str = "1122334455667788112233445566778811223344556677881122334455667788";

/// Gateway that answers according to the device token.
#[derive(Default)]
struct MockGateway {
    attempts: Mutex<HashMap<String, usize>>,
}

impl MockGateway {
    fn attempts(&self, token: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .get(token)
            .copied()
            .unwrap_or(0)
    }
}

fn rejection(status_code: u16, reason: ErrorReason) -> GatewayError {
    GatewayError::Rejected {
        response: Response {
            status_code,
            apns_id: uuid::Uuid::new_v4().to_string(),
        },
        reason,
    }
}

#[async_trait]
impl GatewayClient for MockGateway {
    async fn send(&self, request: &Request) -> Result<Response, GatewayError> {
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(request.token.clone())
            .or_default() += 1;

        tokio::time::sleep(Duration::from_millis(1)).await;
        match request.token.as_str() {
            "missingtopic" => Err(rejection(400, ErrorReason::MissingTopic)),
            "unregistered" => Err(rejection(410, ErrorReason::Unregistered)),
            "baddevicetoken" => Err(rejection(400, ErrorReason::BadDeviceToken)),
            "unreachable" => Err(GatewayError::Transport("connection refused".to_string())),
            _ => Ok(Response {
                status_code: 200,
                apns_id: uuid::Uuid::new_v4().to_string(),
            }),
        }
    }
}

/// Hands every worker the same mock gateway.
struct MockConnector {
    gateway: Arc<MockGateway>,
    fail_at: Option<usize>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, worker_id: usize) -> Result<Arc<dyn GatewayClient>, AppError> {
        if self.fail_at == Some(worker_id) {
            return Err(AppError::Connection(format!(
                "worker {worker_id}: handshake failed"
            )));
        }
        Ok(self.gateway.clone())
    }
}

/// Counts outcomes by reason, `success` for deliveries.
#[derive(Default)]
struct Scoreboard {
    hook: String,
    scores: Mutex<HashMap<String, usize>>,
    calls: AtomicUsize,
}

impl Scoreboard {
    fn with_hook(hook: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            ..Default::default()
        }
    }

    fn score(&self, name: &str) -> usize {
        self.scores.lock().unwrap().get(name).copied().unwrap_or(0)
    }
}

impl ResponseHandler for Scoreboard {
    fn on_response(
        &self,
        _request: &Request,
        _response: Option<&Response>,
        error: Option<&GatewayError>,
    ) {
        let name = match error {
            Some(err) => err.to_string(),
            None => "success".to_string(),
        };
        *self.scores.lock().unwrap().entry(name).or_default() += 1;
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn hook_command(&self) -> &str {
        &self.hook
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        gateway_url: "http://mock".to_string(),
        gateway_timeout_ms: 1000,
        error_hook: None,
        flow: FlowConfig {
            requests_per_sec: 1000,
            worker_num: 2,
            sender_num: 4,
            average_response_time_ms: 150,
            flow_rate_interval_secs: 1,
            queue_size: 100,
            request_queue_size: 100,
        },
        retry: RetryConfig {
            max_retries: 3,
            retry_once_count: 100,
            retry_wait_ms: 10,
        },
        shutdown: ShutdownConfig {
            poll_interval_ms: 2,
            zero_count: 5,
            max_wait_secs: 10,
        },
    }
}

fn repeat_request_data(token: &str, num: usize) -> Batch {
    (0..num)
        .map(|_| {
            Request::new(
                token,
                serde_json::json!({
                    "aps": {
                        "alert": { "title": "test", "body": "message" },
                        "sound": "default"
                    }
                }),
            )
        })
        .collect()
}

async fn start(
    gateway: &Arc<MockGateway>,
    handler: &Arc<Scoreboard>,
) -> Supervisor {
    let connector = MockConnector {
        gateway: gateway.clone(),
        fail_at: None,
    };
    Supervisor::start(
        &test_config(),
        &connector,
        Handlers::new(handler.clone(), handler.clone()),
    )
    .await
    .expect("supervisor should start")
}

/// Poll `cond` until it holds or five seconds pass.
async fn wait_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

// ============================================================
// Lifecycle
// ============================================================

#[tokio::test]
async fn test_start_and_stop_supervisor() {
    let gateway = Arc::new(MockGateway::default());
    let handler = Arc::new(Scoreboard::default());
    let mut sup = start(&gateway, &handler).await;

    wait_until(|| sup.counters().workers == 2).await;

    assert_eq!(sup.shutdown().await, DrainOutcome::Drained);

    let queues = sup.queues();
    for stat in [queues.dispatch, queues.retry, queues.command] {
        assert!(stat.closed);
        assert_eq!(stat.len, 0);
    }
    for worker in &queues.workers {
        assert!(worker.requests.closed);
        assert!(worker.results.closed);
    }
    assert_eq!(sup.counters().workers, 0);
    assert_eq!(sup.counters().senders, 0);

    // A second shutdown leaves everything as it was.
    assert_eq!(sup.shutdown().await, DrainOutcome::Drained);
    assert!(sup.queues().dispatch.closed);
}

#[tokio::test]
async fn test_connection_failure_aborts_startup() {
    let connector = MockConnector {
        gateway: Arc::new(MockGateway::default()),
        fail_at: Some(1),
    };
    let result = Supervisor::start(&test_config(), &connector, Handlers::default()).await;

    match result {
        Err(AppError::Connection(msg)) => assert!(msg.contains("worker 1")),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("startup should have failed"),
    }
}

// ============================================================
// Delivery
// ============================================================

#[tokio::test]
async fn test_enqueue_request_to_supervisor() {
    let gateway = Arc::new(MockGateway::default());
    let handler = Arc::new(Scoreboard::default());
    let mut sup = start(&gateway, &handler).await;

    for _ in 0..7 {
        sup.enqueue_client_request(repeat_request_data(GOOD_TOKEN, 10))
            .unwrap();
    }
    for token in ["missingtopic", "unregistered", "baddevicetoken"] {
        sup.enqueue_client_request(repeat_request_data(token, 1))
            .unwrap();
    }

    wait_until(|| handler.calls.load(Ordering::SeqCst) == 73).await;
    sup.shutdown().await;

    assert_eq!(handler.score("success"), 70);
    assert_eq!(handler.score(ErrorReason::MissingTopic.as_str()), 1);
    assert_eq!(handler.score(ErrorReason::Unregistered.as_str()), 1);
    assert_eq!(handler.score(ErrorReason::BadDeviceToken.as_str()), 1);

    let counters = sup.counters();
    assert_eq!(counters.sent, 70);
    assert_eq!(counters.errors, 3);
    assert_eq!(counters.retries, 0);
    assert_eq!(gateway.attempts(GOOD_TOKEN), 70);
}

#[tokio::test]
async fn test_transport_failure_is_retried_max_tries_then_dropped() {
    let gateway = Arc::new(MockGateway::default());
    let handler = Arc::new(Scoreboard::default());
    let mut sup = start(&gateway, &handler).await;

    sup.enqueue_client_request(repeat_request_data("unreachable", 1))
        .unwrap();

    // One initial attempt plus max_retries resends.
    wait_until(|| gateway.attempts("unreachable") == 4).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(gateway.attempts("unreachable"), 4);
    assert_eq!(sup.counters().retries, 3);
    assert_eq!(sup.queues().retry.len, 0);

    sup.shutdown().await;
    assert_eq!(handler.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_full_dispatch_queue_is_reported_to_caller() {
    let gateway = Arc::new(MockGateway::default());
    let handler = Arc::new(Scoreboard::default());
    let mut sup = start(&gateway, &handler).await;

    // Nothing yields inside the loop, so the workers cannot take anything
    // out of the dispatch queue while it is being filled.
    let capacity = sup.sizing().dispatch;
    let mut rejected = 0;
    for _ in 0..capacity * 4 {
        if let Err(e) = sup.enqueue_client_request(repeat_request_data(GOOD_TOKEN, 50)) {
            assert!(matches!(e, AppError::QueueFull { queue: "dispatch" }));
            rejected += 1;
        }
    }
    assert_eq!(rejected, capacity * 3);

    assert_eq!(sup.shutdown().await, DrainOutcome::Drained);

    // Admitted batches were taken whole: every request either got an outcome
    // or was shed at the result queue.
    let delivered = handler.score("success") as u64;
    assert_eq!(delivered + sup.counters().dropped, (capacity * 50) as u64);
}

// ============================================================
// Error hook
// ============================================================

#[tokio::test]
async fn test_terminal_error_invokes_hook_once() {
    let out = std::env::temp_dir().join(format!("courier-hook-{}.json", uuid::Uuid::new_v4()));
    let gateway = Arc::new(MockGateway::default());
    let handler = Arc::new(Scoreboard::with_hook(format!("cat >> {}", out.display())));
    let mut sup = start(&gateway, &handler).await;

    let batch = repeat_request_data("unregistered", 1);
    let payload = batch[0].payload.clone();
    sup.enqueue_client_request(batch).unwrap();
    sup.enqueue_client_request(repeat_request_data("unreachable", 1))
        .unwrap();

    wait_until(|| handler.calls.load(Ordering::SeqCst) == 5).await;
    sup.shutdown().await;

    let written = std::fs::read(&out).expect("hook should have written its input");
    let _ = std::fs::remove_file(&out);

    // Only the terminal error carries a response, so exactly one document.
    let decoded: serde_json::Value = serde_json::from_slice(&written).unwrap();
    assert_eq!(decoded["request"]["token"], "unregistered");
    assert_eq!(decoded["request"]["payload"], payload);
    assert_eq!(decoded["response"]["status_code"], 410);
    assert_eq!(decoded["error_msg"], "Unregistered");
    assert!(decoded["resp_uid"].as_str().is_some());
}
