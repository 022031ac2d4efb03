//! Worker: one gateway connection fanned out over a pool of senders.
//!
//! A worker competes with its siblings for batches on the shared dispatch
//! queue and copies each request into its own request queue. That put
//! suspends when the request queue is full, which stalls batch intake and is
//! how gateway slowness propagates back to the provider. Results coming back
//! from the senders are classified by a separate drain task, so a stalled
//! intake never stops results from being processed.

use std::sync::Arc;

use tokio::task::JoinHandle;

use courier_common::types::{Batch, Request};

use crate::classifier::Classifier;
use crate::gateway::GatewayClient;
use crate::queue::{BoundedQueue, QueueStat};
use crate::sender::{SendResult, run_sender};
use crate::shutdown::ShutdownSignal;
use crate::stats::Stats;

/// The worker-owned queues, as observed by the supervisor.
#[derive(Clone)]
pub struct WorkerQueues {
    pub requests: BoundedQueue<Request>,
    pub results: BoundedQueue<SendResult>,
}

impl WorkerQueues {
    pub fn len(&self) -> usize {
        self.requests.len() + self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> (QueueStat, QueueStat) {
        (self.requests.stat(), self.results.stat())
    }
}

pub struct Worker {
    id: usize,
    client: Arc<dyn GatewayClient>,
    queues: WorkerQueues,
    sender_num: usize,
}

impl Worker {
    pub fn new(
        id: usize,
        client: Arc<dyn GatewayClient>,
        queue_size: usize,
        sender_num: usize,
    ) -> Self {
        Self {
            id,
            client,
            queues: WorkerQueues {
                requests: BoundedQueue::new("worker_requests", queue_size),
                results: BoundedQueue::new("worker_results", queue_size),
            },
            sender_num,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn queues(&self) -> WorkerQueues {
        self.queues.clone()
    }

    /// Pull batches until shutdown, then drain.
    ///
    /// On shutdown the request queue is closed, the senders finish whatever is
    /// still buffered, and the remaining results are classified before this
    /// returns.
    pub async fn run(
        self,
        dispatch: BoundedQueue<Batch>,
        classifier: Arc<Classifier>,
        stats: Arc<Stats>,
        mut shutdown: ShutdownSignal,
    ) {
        stats.worker_started();

        let senders: Vec<JoinHandle<()>> = (0..self.sender_num)
            .map(|sender_id| {
                tracing::debug!(worker_id = self.id, sender_id, "Spawning sender");
                tokio::spawn(run_sender(
                    self.id,
                    sender_id,
                    self.client.clone(),
                    self.queues.requests.clone(),
                    self.queues.results.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        let drain = tokio::spawn(drain_results(
            self.id,
            self.queues.results.clone(),
            classifier,
        ));

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                batch = dispatch.take() => match batch {
                    Some(batch) => {
                        if !self.receive_requests(batch, &stats, &mut shutdown).await {
                            break;
                        }
                    }
                    None => break,
                },
            }
        }

        self.queues.requests.close();
        for handle in senders {
            if let Err(e) = handle.await {
                tracing::error!(worker_id = self.id, error = %e, "Sender task failed");
            }
        }

        self.queues.results.close();
        if let Err(e) = drain.await {
            tracing::error!(worker_id = self.id, error = %e, "Result drain task failed");
        }

        stats.worker_stopped();
        tracing::info!(worker_id = self.id, "Worker stopped");
    }

    /// Copy a batch into the request queue, waiting for room.
    ///
    /// Returns `false` when shutdown interrupted the hand-off; the requests not
    /// yet queued are dropped and counted.
    async fn receive_requests(
        &self,
        batch: Batch,
        stats: &Stats,
        shutdown: &mut ShutdownSignal,
    ) -> bool {
        let request_size = batch.len();
        let mut pending = batch.into_iter();

        while let Some(request) = pending.next() {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    let dropped = pending.len() + 1;
                    stats.record_dropped_many(dropped as u64);
                    tracing::warn!(
                        worker_id = self.id,
                        request_size,
                        dropped,
                        "Shutdown while enqueueing batch, dropping remaining requests"
                    );
                    return false;
                }
                put = self.queues.requests.put(request) => {
                    if put.is_err() {
                        let dropped = pending.len() + 1;
                        stats.record_dropped_many(dropped as u64);
                        tracing::warn!(
                            worker_id = self.id,
                            request_size,
                            dropped,
                            "Worker queue closed, dropping remaining requests"
                        );
                        return false;
                    }
                }
            }
        }

        tracing::debug!(
            worker_id = self.id,
            request_size,
            worker_queue_size = self.queues.requests.len(),
            "Enqueued batch into worker queue"
        );
        true
    }
}

async fn drain_results(
    worker_id: usize,
    results: BoundedQueue<SendResult>,
    classifier: Arc<Classifier>,
) {
    while let Some(result) = results.take().await {
        classifier.classify(worker_id, result);
    }
}
