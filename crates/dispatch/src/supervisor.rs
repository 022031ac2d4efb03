//! Supervisor: owns every queue, spawns the pipeline, and coordinates shutdown.
//!
//! ```text
//! provider ─► dispatch ─► worker ─► requests ─► sender ─► results ─► classifier
//!                ▲                                                   │
//!                └──────── retry ticker ◄── retry ◄──────────────────┤
//!                                      executors ◄── commands ◄──────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use courier_common::config::{AppConfig, ShutdownConfig};
use courier_common::error::AppError;
use courier_common::types::{Batch, Request};

use crate::classifier::Classifier;
use crate::command::{Command, run_executor};
use crate::flow::QueueSizing;
use crate::gateway::{Connector, GatewayClient};
use crate::handler::Handlers;
use crate::queue::{BoundedQueue, QueueStat, TryPutError};
use crate::retry::RetryTicker;
use crate::shutdown::{self, ShutdownTrigger};
use crate::stats::{Counters, Stats};
use crate::worker::{Worker, WorkerQueues};

/// How the shutdown drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every queue read empty for the required number of consecutive polls.
    Drained,
    /// The maximum wait elapsed with work still queued.
    TimedOut,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerQueueStat {
    pub worker_id: usize,
    pub requests: QueueStat,
    pub results: QueueStat,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub dispatch: QueueStat,
    pub retry: QueueStat,
    pub command: QueueStat,
    pub workers: Vec<WorkerQueueStat>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub counters: Counters,
    pub sizing: QueueSizing,
    pub queues: QueueStats,
}

/// Running dispatch pipeline.
///
/// Dropping a supervisor without calling [`Supervisor::shutdown`] fires the
/// shutdown signal and closes the command queue without draining. Workers
/// and the retry ticker stop at the signal, executors once the queued hooks
/// have run.
pub struct Supervisor {
    dispatch: BoundedQueue<Batch>,
    retry: BoundedQueue<Request>,
    commands: BoundedQueue<Command>,
    workers: Vec<WorkerQueues>,
    sizing: QueueSizing,
    shutdown_config: ShutdownConfig,
    trigger: ShutdownTrigger,
    stats: Arc<Stats>,
    worker_tasks: Vec<JoinHandle<()>>,
    executor_tasks: Vec<JoinHandle<()>>,
    ticker_task: Option<JoinHandle<()>>,
}

impl Supervisor {
    /// Size the queues, connect one gateway client per worker, and spawn the
    /// workers, the command executors and the retry ticker.
    ///
    /// The configuration is validated first, and every connection is
    /// established before anything is spawned, so an invalid configuration
    /// or a connection failure returns the error with nothing left running.
    pub async fn start(
        config: &AppConfig,
        connector: &dyn Connector,
        handlers: Handlers,
    ) -> Result<Self, AppError> {
        config.validate()?;

        let sizing = QueueSizing::compute(&config.flow);
        let worker_num = config.flow.worker_num;

        let mut clients: Vec<Arc<dyn GatewayClient>> = Vec::with_capacity(worker_num);
        for worker_id in 0..worker_num {
            match connector.connect(worker_id).await {
                Ok(client) => {
                    tracing::info!(worker_id, "Succeeded to establish new connection");
                    clients.push(client);
                }
                Err(e) => {
                    tracing::error!(worker_id, error = %e, "Failed to establish connection");
                    return Err(e);
                }
            }
        }

        let (trigger, signal) = shutdown::channel();
        let stats = Arc::new(Stats::new());
        let dispatch = BoundedQueue::new("dispatch", sizing.dispatch);
        let retry = BoundedQueue::new("retry", sizing.retry);
        let commands = BoundedQueue::new("command", sizing.command);

        tracing::info!(
            dispatch_queue = sizing.dispatch,
            retry_queue = sizing.retry,
            command_queue = sizing.command,
            worker_queue = sizing.worker,
            workers = worker_num,
            senders_per_worker = config.flow.sender_num,
            "Sized supervisor queues"
        );

        let executor_tasks = (0..worker_num)
            .map(|executor_id| tokio::spawn(run_executor(executor_id, commands.clone())))
            .collect();

        let ticker = RetryTicker::new(
            retry.clone(),
            dispatch.clone(),
            stats.clone(),
            config.retry.retry_wait(),
            config.retry.retry_once_count,
        );
        let ticker_task = Some(tokio::spawn(ticker.run(signal.clone())));

        let classifier = Arc::new(Classifier::new(
            handlers,
            retry.clone(),
            commands.clone(),
            stats.clone(),
            config.retry.max_retries,
        ));

        let mut workers = Vec::with_capacity(worker_num);
        let mut worker_tasks = Vec::with_capacity(worker_num);
        for (worker_id, client) in clients.into_iter().enumerate() {
            let worker = Worker::new(worker_id, client, sizing.worker, config.flow.sender_num);
            workers.push(worker.queues());
            worker_tasks.push(tokio::spawn(worker.run(
                dispatch.clone(),
                classifier.clone(),
                stats.clone(),
                signal.clone(),
            )));
            tracing::debug!(worker_id, "Spawned worker");
        }

        Ok(Self {
            dispatch,
            retry,
            commands,
            workers,
            sizing,
            shutdown_config: config.shutdown.clone(),
            trigger,
            stats,
            worker_tasks,
            executor_tasks,
            ticker_task,
        })
    }

    /// Admit a batch from the provider.
    ///
    /// Never waits. A full dispatch queue rejects the whole batch.
    pub fn enqueue_client_request(&self, batch: Batch) -> Result<(), AppError> {
        let request_size = batch.len();
        match self.dispatch.try_put(batch) {
            Ok(()) => {
                tracing::debug!(
                    request_size,
                    queue_size = self.dispatch.len(),
                    retry_queue_size = self.retry.len(),
                    "Enqueued request from provider"
                );
                Ok(())
            }
            Err(TryPutError::Full(_)) => {
                tracing::warn!(
                    request_size,
                    queue_size = self.dispatch.len(),
                    retry_queue_size = self.retry.len(),
                    "Supervisor's queue is full"
                );
                Err(AppError::QueueFull {
                    queue: self.dispatch.name(),
                })
            }
            Err(TryPutError::Closed(_)) => Err(AppError::QueueClosed {
                queue: self.dispatch.name(),
            }),
        }
    }

    /// Items currently buffered anywhere in the pipeline.
    pub fn pending(&self) -> usize {
        self.dispatch.len()
            + self.commands.len()
            + self.retry.len()
            + self.workers.iter().map(WorkerQueues::len).sum::<usize>()
    }

    pub fn sizing(&self) -> QueueSizing {
        self.sizing
    }

    pub fn counters(&self) -> Counters {
        self.stats.counters()
    }

    pub fn queues(&self) -> QueueStats {
        QueueStats {
            dispatch: self.dispatch.stat(),
            retry: self.retry.stat(),
            command: self.commands.stat(),
            workers: self
                .workers
                .iter()
                .enumerate()
                .map(|(worker_id, queues)| {
                    let (requests, results) = queues.stats();
                    WorkerQueueStat {
                        worker_id,
                        requests,
                        results,
                    }
                })
                .collect(),
        }
    }

    pub fn stats(&self) -> StatsSnapshot {
        StatsSnapshot {
            counters: self.counters(),
            sizing: self.sizing,
            queues: self.queues(),
        }
    }

    /// Drain, then stop every task.
    ///
    /// The drain waits until the pipeline reads empty for
    /// `zero_count` consecutive polls or `max_wait` has elapsed. After that
    /// the shutdown signal fires, workers and the ticker are joined, the
    /// command queue is closed and the executors finish what it still holds,
    /// and finally the dispatch and retry queues are closed.
    pub async fn shutdown(&mut self) -> DrainOutcome {
        if self.trigger.is_triggered() {
            tracing::debug!("Supervisor already stopped");
            return DrainOutcome::Drained;
        }
        tracing::info!("Waiting for stopping supervisor...");

        let outcome = self.drain().await;

        self.trigger.trigger();
        for handle in self.worker_tasks.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        if let Some(handle) = self.ticker_task.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Retry ticker task failed");
            }
        }

        self.commands.close();
        for handle in self.executor_tasks.drain(..) {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Command executor task failed");
            }
        }

        self.dispatch.close();
        self.retry.close();

        let counters = self.stats.counters();
        tracing::info!(
            sent = counters.sent,
            errors = counters.errors,
            retries = counters.retries,
            dropped = counters.dropped,
            abandoned = self.pending(),
            "Stopped supervisor"
        );
        outcome
    }

    async fn drain(&self) -> DrainOutcome {
        let required = self.shutdown_config.zero_count;
        let poll_interval = self.shutdown_config.poll_interval();
        let max_wait = self.shutdown_config.max_wait();
        let started = Instant::now();
        let mut zero_count = 0;

        loop {
            if self.pending() > 0 {
                zero_count = 0;
            } else {
                zero_count += 1;
            }
            if zero_count >= required {
                return DrainOutcome::Drained;
            }

            if started.elapsed() >= max_wait {
                tracing::warn!(
                    pending = self.pending(),
                    waited_secs = max_wait.as_secs(),
                    "Drain wait exceeded, forcing shutdown"
                );
                return DrainOutcome::TimedOut;
            }
            tokio::time::sleep(poll_interval.max(Duration::from_millis(1))).await;
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.trigger.trigger();
        self.commands.close();
    }
}
