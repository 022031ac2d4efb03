//! Process counters shared by every pipeline task.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Atomic counters. Each update is a single atomic add.
#[derive(Debug)]
pub struct Stats {
    started_at: DateTime<Utc>,
    workers: AtomicI64,
    senders: AtomicI64,
    sent: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    dropped: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            workers: AtomicI64::new(0),
            senders: AtomicI64::new(0),
            sent: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn worker_started(&self) {
        self.workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self) {
        self.workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn sender_started(&self) {
        self.senders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sender_stopped(&self) {
        self.senders.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Something was shed because a queue was full.
    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped_many(&self, count: u64) {
        self.dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn counters(&self) -> Counters {
        Counters {
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            workers: self.workers.load(Ordering::Relaxed),
            senders: self.senders.load(Ordering::Relaxed),
            sent: self.sent(),
            errors: self.errors(),
            retries: self.retries(),
            dropped: self.dropped(),
        }
    }
}

impl Default for Stats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Serialize)]
pub struct Counters {
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub workers: i64,
    pub senders: i64,
    pub sent: u64,
    pub errors: u64,
    pub retries: u64,
    pub dropped: u64,
}
