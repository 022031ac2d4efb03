use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::AppError;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Base URL of the push gateway
    pub gateway_url: String,

    /// Per-request timeout against the gateway in milliseconds (default: 5000)
    pub gateway_timeout_ms: u64,

    /// Shell command invoked with the failed result on stdin
    pub error_hook: Option<String>,

    pub flow: FlowConfig,
    pub retry: RetryConfig,
    pub shutdown: ShutdownConfig,
}

/// Throughput targets used to size every queue at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Target requests per second towards the gateway
    pub requests_per_sec: usize,

    /// Number of workers, one gateway connection each
    pub worker_num: usize,

    /// Number of senders per worker
    pub sender_num: usize,

    /// Estimated gateway latency per request in milliseconds
    pub average_response_time_ms: usize,

    /// Window the flow rate is measured over, in seconds
    pub flow_rate_interval_secs: usize,

    /// Capacity of the dispatch queue, in batches
    pub queue_size: usize,

    /// Requests a provider may hand over at once
    pub request_queue_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of resends after a transport failure
    pub max_retries: u32,

    /// Retry queue entries moved to the dispatch queue per tick
    pub retry_once_count: usize,

    /// Interval between retry ticks in milliseconds
    pub retry_wait_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShutdownConfig {
    /// Sleep between two drain polls in milliseconds
    pub poll_interval_ms: u64,

    /// Consecutive empty polls required before stopping
    pub zero_count: u32,

    /// Upper bound on the drain wait in seconds
    pub max_wait_secs: u64,
}

impl RetryConfig {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }
}

impl ShutdownConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            retry_once_count: 1000,
            retry_wait_ms: 500,
        }
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 10,
            zero_count: 50,
            max_wait_secs: 120,
        }
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            requests_per_sec: 2000,
            worker_num: 8,
            sender_num: 50,
            average_response_time_ms: 150,
            flow_rate_interval_secs: 1,
            queue_size: 2000,
            request_queue_size: 2000,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let flow_defaults = FlowConfig::default();
        let retry_defaults = RetryConfig::default();
        let shutdown_defaults = ShutdownConfig::default();

        let config = Self {
            gateway_url: lookup("GATEWAY_URL")
                .unwrap_or_else(|| "http://localhost:2195".to_string()),
            gateway_timeout_ms: parse_or(&lookup, "GATEWAY_TIMEOUT_MS", 5000)?,
            error_hook: lookup("ERROR_HOOK").filter(|hook| !hook.trim().is_empty()),
            flow: FlowConfig {
                requests_per_sec: parse_or(
                    &lookup,
                    "REQUESTS_PER_SEC",
                    flow_defaults.requests_per_sec,
                )?,
                worker_num: parse_or(&lookup, "WORKER_NUM", flow_defaults.worker_num)?,
                sender_num: parse_or(&lookup, "SENDER_NUM", flow_defaults.sender_num)?,
                average_response_time_ms: parse_or(
                    &lookup,
                    "AVERAGE_RESPONSE_TIME_MS",
                    flow_defaults.average_response_time_ms,
                )?,
                flow_rate_interval_secs: parse_or(
                    &lookup,
                    "FLOW_RATE_INTERVAL_SECS",
                    flow_defaults.flow_rate_interval_secs,
                )?,
                queue_size: parse_or(&lookup, "QUEUE_SIZE", flow_defaults.queue_size)?,
                request_queue_size: parse_or(
                    &lookup,
                    "REQUEST_QUEUE_SIZE",
                    flow_defaults.request_queue_size,
                )?,
            },
            retry: RetryConfig {
                max_retries: parse_or(&lookup, "SEND_RETRY_COUNT", retry_defaults.max_retries)?,
                retry_once_count: parse_or(
                    &lookup,
                    "RETRY_ONCE_COUNT",
                    retry_defaults.retry_once_count,
                )?,
                retry_wait_ms: parse_or(&lookup, "RETRY_WAIT_MS", retry_defaults.retry_wait_ms)?,
            },
            shutdown: ShutdownConfig {
                poll_interval_ms: parse_or(
                    &lookup,
                    "SHUTDOWN_POLL_MS",
                    shutdown_defaults.poll_interval_ms,
                )?,
                zero_count: parse_or(
                    &lookup,
                    "SHUTDOWN_ZERO_COUNT",
                    shutdown_defaults.zero_count,
                )?,
                max_wait_secs: parse_or(
                    &lookup,
                    "SHUTDOWN_MAX_WAIT_SECS",
                    shutdown_defaults.max_wait_secs,
                )?,
            },
        };

        config.validate()?;
        tracing::info!(
            gateway_url = %config.gateway_url,
            workers = config.flow.worker_num,
            senders = config.flow.sender_num,
            hook = config.error_hook.is_some(),
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Reject settings that would leave the pipeline without capacity.
    pub fn validate(&self) -> Result<(), AppError> {
        let flow = &self.flow;
        let required = [
            ("WORKER_NUM", flow.worker_num),
            ("SENDER_NUM", flow.sender_num),
            ("REQUESTS_PER_SEC", flow.requests_per_sec),
            ("FLOW_RATE_INTERVAL_SECS", flow.flow_rate_interval_secs),
            ("QUEUE_SIZE", flow.queue_size),
            ("REQUEST_QUEUE_SIZE", flow.request_queue_size),
            ("RETRY_ONCE_COUNT", self.retry.retry_once_count),
        ];
        if let Some((name, _)) = required.iter().find(|(_, value)| *value == 0) {
            return Err(AppError::Config(format!("{name} must be greater than zero")));
        }
        if self.retry.retry_wait_ms == 0 {
            return Err(AppError::Config(
                "RETRY_WAIT_MS must be greater than zero".to_string(),
            ));
        }
        if self.shutdown.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "SHUTDOWN_POLL_MS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_millis(self.gateway_timeout_ms)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key} must be a valid {}", std::any::type_name::<T>())),
        None => Ok(default),
    }
}
