// SPDX-License-Identifier: MIT OR Apache-2.0
//! The fixed pool of delivery workers.

use crate::worker::{DeliveryWorker, PermanentFailureCallback, ServerTimeCallback};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

/// A fixed-size pool of [`DeliveryWorker`]s.
///
/// `acquire` runs on the dispatcher task (the pipeline's single
/// consumer), scanning for the first idle worker. The permanent-failure
/// callback handed to each worker is de-duplicated: the owner observes at
/// most one notification no matter how many workers fail.
pub struct WorkerPool {
    workers: Vec<Arc<DeliveryWorker>>,
}

impl WorkerPool {
    /// Build `size` workers sharing one HTTP client.
    pub fn new(
        client: reqwest::Client,
        size: usize,
        retry_delay: Duration,
        server_time: ServerTimeCallback,
        permanent_failure: Option<PermanentFailureCallback>,
    ) -> Self {
        let permanent_failure = permanent_failure.unwrap_or_else(|| {
            Arc::new(|status| {
                error!(status, "giving up on event delivery permanently");
            })
        });
        let once = Arc::new(AtomicBool::new(false));
        let deduplicated: PermanentFailureCallback = Arc::new(move |status| {
            if !once.swap(true, Ordering::SeqCst) {
                permanent_failure(status);
            }
        });

        let workers = (0..size.max(1))
            .map(|_| {
                Arc::new(DeliveryWorker::new(
                    client.clone(),
                    retry_delay,
                    server_time.clone(),
                    deduplicated.clone(),
                ))
            })
            .collect();
        Self { workers }
    }

    /// The first free worker, reserved for the caller; `None` when every
    /// worker is busy or permanently failed.
    pub fn acquire(&self) -> Option<Arc<DeliveryWorker>> {
        self.workers
            .iter()
            .find(|worker| worker.try_reserve())
            .cloned()
    }

    /// Number of workers in the pool.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// Always false; pools are never empty.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}
