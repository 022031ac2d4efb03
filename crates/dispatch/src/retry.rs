//! Periodic re-injection of retry-eligible requests into the dispatch path.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use courier_common::types::{Batch, Request};

use crate::queue::{BoundedQueue, TryPutError};
use crate::shutdown::ShutdownSignal;
use crate::stats::Stats;

pub struct RetryTicker {
    retry_queue: BoundedQueue<Request>,
    dispatch_queue: BoundedQueue<Batch>,
    stats: Arc<Stats>,
    interval: Duration,
    once_count: usize,
}

impl RetryTicker {
    pub fn new(
        retry_queue: BoundedQueue<Request>,
        dispatch_queue: BoundedQueue<Batch>,
        stats: Arc<Stats>,
        interval: Duration,
        once_count: usize,
    ) -> Self {
        Self {
            retry_queue,
            dispatch_queue,
            stats,
            interval,
            once_count,
        }
    }

    /// Tick until shutdown is signalled.
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                _ = ticker.tick() => {
                    self.tick();
                }
            }
        }

        tracing::debug!("Retry ticker stopped");
    }

    /// Move up to `once_count` entries from the retry queue to the dispatch
    /// queue, each as its own batch. Returns how many were moved.
    pub fn tick(&self) -> usize {
        let mut moved = 0;
        for _ in 0..self.once_count {
            let Some(request) = self.retry_queue.try_take() else {
                break;
            };
            let resend_cnt = request.tries;

            match self.dispatch_queue.try_put(vec![request]) {
                Ok(()) => {
                    moved += 1;
                    tracing::debug!(resend_cnt, "Enqueued retry into dispatch queue");
                }
                Err(TryPutError::Full(batch)) => {
                    self.stats.record_dropped();
                    tracing::info!(
                        resend_cnt,
                        token = batch.first().map(|r| r.token.as_str()),
                        "Could not retry because the dispatch queue is full"
                    );
                }
                Err(TryPutError::Closed(batch)) => {
                    self.stats.record_dropped();
                    tracing::info!(
                        resend_cnt,
                        token = batch.first().map(|r| r.token.as_str()),
                        "Could not retry because the dispatch queue is closed"
                    );
                }
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queues(dispatch_capacity: usize) -> (BoundedQueue<Request>, BoundedQueue<Batch>) {
        let retry = BoundedQueue::new("retry", 16);
        for i in 0..5 {
            let mut req = Request::new(format!("t{i}"), serde_json::json!({}));
            req.tries = 1;
            retry.try_put(req).unwrap();
        }
        (retry, BoundedQueue::new("dispatch", dispatch_capacity))
    }

    #[test]
    fn test_tick_moves_at_most_once_count() {
        let (retry, dispatch) = queues(16);
        let ticker = RetryTicker::new(
            retry.clone(),
            dispatch.clone(),
            Arc::new(Stats::new()),
            Duration::from_millis(10),
            3,
        );

        assert_eq!(ticker.tick(), 3);
        assert_eq!(retry.len(), 2);
        assert_eq!(dispatch.len(), 3);
        assert_eq!(dispatch.try_take().unwrap().len(), 1);
    }

    #[test]
    fn test_full_dispatch_queue_drops_instead_of_blocking() {
        let (retry, dispatch) = queues(2);
        let stats = Arc::new(Stats::new());
        let ticker = RetryTicker::new(
            retry.clone(),
            dispatch.clone(),
            stats.clone(),
            Duration::from_millis(10),
            10,
        );

        assert_eq!(ticker.tick(), 2);
        assert!(retry.is_empty());
        assert_eq!(stats.dropped(), 3);
    }

    #[test]
    fn test_closed_dispatch_queue_drops_retries() {
        let (retry, dispatch) = queues(16);
        dispatch.close();
        let stats = Arc::new(Stats::new());
        let ticker = RetryTicker::new(
            retry.clone(),
            dispatch,
            stats.clone(),
            Duration::from_millis(10),
            10,
        );

        assert_eq!(ticker.tick(), 0);
        assert!(retry.is_empty());
        assert_eq!(stats.dropped(), 5);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (retry, dispatch) = queues(16);
        let ticker = RetryTicker::new(
            retry,
            dispatch.clone(),
            Arc::new(Stats::new()),
            Duration::from_millis(5),
            100,
        );
        let (trigger, signal) = crate::shutdown::channel();

        let handle = tokio::spawn(ticker.run(signal));
        tokio::time::sleep(Duration::from_millis(30)).await;
        trigger.trigger();

        handle.await.unwrap();
        assert_eq!(dispatch.len(), 5);
    }
}
