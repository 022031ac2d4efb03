//! HTTP client towards an APNs-style push gateway.
//!
//! The payload is posted as-is to `{base}/3/device/{token}`. A 2xx reply is a
//! delivery, any other status is a terminal rejection whose reason is read
//! from a `{"reason": "..."}` body, and a request that never got a reply is a
//! transport failure.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use courier_common::error::{AppError, GatewayError};
use courier_common::types::{ErrorReason, Request, Response};

use super::{Connector, GatewayClient};

const APNS_ID_HEADER: &str = "apns-id";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    reason: String,
}

pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn device_url(&self, token: &str) -> String {
        format!("{}/3/device/{}", self.base_url, token)
    }
}

#[async_trait]
impl GatewayClient for HttpGateway {
    async fn send(&self, request: &Request) -> Result<Response, GatewayError> {
        let reply = self
            .client
            .post(self.device_url(&request.token))
            .json(&request.payload)
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        let status = reply.status();
        let response = Response {
            status_code: status.as_u16(),
            apns_id: reply
                .headers()
                .get(APNS_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string(),
        };

        if status.is_success() {
            return Ok(response);
        }

        let body = reply.bytes().await.unwrap_or_default();
        Err(GatewayError::Rejected {
            reason: parse_reason(&body, status.as_u16()),
            response,
        })
    }
}

/// Read the reason code out of an error body, falling back to the status.
fn parse_reason(body: &[u8], status: u16) -> ErrorReason {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed
            .reason
            .parse()
            .unwrap_or_else(|never| match never {}),
        Err(_) => match status {
            410 => ErrorReason::Unregistered,
            413 => ErrorReason::PayloadTooLarge,
            429 => ErrorReason::TooManyRequests,
            500 => ErrorReason::InternalServerError,
            503 => ErrorReason::ServiceUnavailable,
            other => ErrorReason::Other(format!("HTTP {other}")),
        },
    }
}

/// Builds one [`HttpGateway`] per worker, each with its own connection pool.
pub struct HttpConnector {
    base_url: String,
    timeout: Duration,
}

impl HttpConnector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, worker_id: usize) -> Result<Arc<dyn GatewayClient>, AppError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(1)
            .build()
            .map_err(|e| AppError::Connection(format!("worker {worker_id}: {e}")))?;

        tracing::debug!(worker_id, base_url = %self.base_url, "Built gateway client");
        Ok(Arc::new(HttpGateway::new(client, self.base_url.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_url_strips_trailing_slash() {
        let gateway = HttpGateway::new(reqwest::Client::new(), "https://gateway.test/");
        assert_eq!(
            gateway.device_url("abcd"),
            "https://gateway.test/3/device/abcd"
        );
    }

    #[test]
    fn test_reason_read_from_body() {
        let reason = parse_reason(br#"{"reason":"BadDeviceToken"}"#, 400);
        assert_eq!(reason, ErrorReason::BadDeviceToken);
    }

    #[test]
    fn test_reason_falls_back_to_status() {
        assert_eq!(parse_reason(b"", 410), ErrorReason::Unregistered);
        assert_eq!(
            parse_reason(b"<html>", 418),
            ErrorReason::Other("HTTP 418".to_string())
        );
    }

    #[tokio::test]
    async fn test_connector_builds_a_client() {
        let connector = HttpConnector::new("http://127.0.0.1:1", Duration::from_millis(50));
        assert!(connector.connect(0).await.is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_gateway_is_a_transport_error() {
        let connector = HttpConnector::new("http://127.0.0.1:1", Duration::from_millis(200));
        let gateway = connector.connect(0).await.unwrap();
        let err = gateway
            .send(&Request::new("abcd", serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Transport(_)));
    }
}
