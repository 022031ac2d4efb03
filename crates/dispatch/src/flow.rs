//! Queue sizing derived from flow-control targets.
//!
//! Capacities are computed once at startup and never change afterwards.

use serde::Serialize;

use courier_common::config::FlowConfig;

/// Capacities of every queue owned by the supervisor and its workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueSizing {
    /// Dispatch queue, counted in batches.
    pub dispatch: usize,
    pub retry: usize,
    pub command: usize,
    /// Request queue and result queue of each worker.
    pub worker: usize,
}

impl QueueSizing {
    /// Balance the target request rate against what the sender pool can
    /// absorb at the estimated latency.
    ///
    /// `throughput` is how many requests a single sender is expected to be
    /// holding while a full provider batch is in flight. The per-worker queue
    /// is sized to buffer the gap between that and the target rate over one
    /// flow-rate interval.
    pub fn compute(flow: &FlowConfig) -> Self {
        let workers = flow.worker_num.max(1);
        let senders = flow.sender_num.max(1);

        let throughput =
            ((flow.request_queue_size * flow.average_response_time_ms / 1000) / senders).max(1);
        let absorbed = (flow.request_queue_size / throughput) as i64;
        let gap = (flow.requests_per_sec as i64 - absorbed).unsigned_abs() as usize;
        let worker = (gap * flow.flow_rate_interval_secs / workers).max(1);

        Self {
            dispatch: flow.queue_size.max(1),
            retry: (flow.request_queue_size * workers).max(1),
            command: (worker * workers).max(1),
            worker,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_flow_sizing() {
        let sizing = QueueSizing::compute(&FlowConfig::default());
        // throughput = (2000 * 150 / 1000) / 50 = 6, absorbed = 333, gap = 1667
        assert_eq!(sizing.worker, 208);
        assert_eq!(sizing.command, 208 * 8);
        assert_eq!(sizing.retry, 2000 * 8);
        assert_eq!(sizing.dispatch, 2000);
    }

    #[test]
    fn test_negative_gap_uses_magnitude() {
        let flow = FlowConfig {
            requests_per_sec: 100,
            worker_num: 2,
            sender_num: 1,
            average_response_time_ms: 1000,
            flow_rate_interval_secs: 1,
            queue_size: 10,
            request_queue_size: 1000,
        };
        // throughput = 1000, absorbed = 1, gap = 99
        let sizing = QueueSizing::compute(&flow);
        assert_eq!(sizing.worker, 49);
    }

    #[test]
    fn test_tiny_latency_never_divides_by_zero() {
        let flow = FlowConfig {
            requests_per_sec: 10,
            worker_num: 4,
            sender_num: 100,
            average_response_time_ms: 1,
            flow_rate_interval_secs: 1,
            queue_size: 1,
            request_queue_size: 10,
        };
        let sizing = QueueSizing::compute(&flow);
        assert!(sizing.worker >= 1);
        assert!(sizing.command >= 1);
    }

    #[test]
    fn test_single_worker_gets_whole_gap() {
        let flow = FlowConfig {
            requests_per_sec: 10,
            worker_num: 1,
            sender_num: 1,
            average_response_time_ms: 1000,
            flow_rate_interval_secs: 1,
            queue_size: 1,
            request_queue_size: 10,
        };
        // throughput = 10, absorbed = 1, gap = 9
        assert_eq!(QueueSizing::compute(&flow).worker, 9);
    }
}
