// SPDX-License-Identifier: MIT OR Apache-2.0
//! The delivery worker: one payload, at most two HTTP attempts.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Called with the server's clock whenever a delivery succeeds and the
/// response carried a parseable `Date` header.
pub type ServerTimeCallback = Arc<dyn Fn(DateTime<Utc>) + Send + Sync>;

/// Called when a delivery fails permanently (e.g. the SDK key was
/// rejected). The pool guarantees at most one invocation overall.
pub type PermanentFailureCallback = Arc<dyn Fn(u16) + Send + Sync>;

/// One serialized batch of events plus the idempotency id reused across
/// the retry.
#[derive(Clone, Debug)]
pub struct EventBatch {
    /// Destination URL (`<events base>/bulk`).
    pub url: String,
    /// JSON array body.
    pub body: String,
    /// `X-LaunchDarkly-Payload-Id` value, stable across the retry.
    pub payload_id: String,
}

const STATE_IDLE: u8 = 0;
const STATE_BUSY: u8 = 1;
const STATE_FAILED: u8 = 2;

/// Externally visible lifecycle of a worker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Free to accept a payload.
    Idle,
    /// Delivering (first or second attempt).
    Busy,
    /// Permanently failed; never usable again.
    PermanentlyFailed,
}

enum Outcome {
    Success(Option<DateTime<Utc>>),
    Recoverable,
    Permanent(u16),
}

/// Delivers one payload at a time over HTTP with a single retry.
///
/// State machine: `Idle -> FirstChance -> (Idle | SecondChance |
/// PermanentlyFailed)`; a second recoverable failure drops the payload
/// rather than retrying again. A permanently failed worker is never
/// returned to the pool.
pub struct DeliveryWorker {
    client: reqwest::Client,
    retry_delay: Duration,
    state: AtomicU8,
    server_time: ServerTimeCallback,
    permanent_failure: PermanentFailureCallback,
}

impl DeliveryWorker {
    /// Create an idle worker.
    pub fn new(
        client: reqwest::Client,
        retry_delay: Duration,
        server_time: ServerTimeCallback,
        permanent_failure: PermanentFailureCallback,
    ) -> Self {
        Self {
            client,
            retry_delay,
            state: AtomicU8::new(STATE_IDLE),
            server_time,
            permanent_failure,
        }
    }

    /// Current lifecycle state.
    pub fn status(&self) -> WorkerStatus {
        match self.state.load(Ordering::SeqCst) {
            STATE_IDLE => WorkerStatus::Idle,
            STATE_BUSY => WorkerStatus::Busy,
            _ => WorkerStatus::PermanentlyFailed,
        }
    }

    /// Reserve the worker for one delivery. Only the pool calls this, on
    /// the dispatcher task, so the check-and-set is not racy.
    pub(crate) fn try_reserve(&self) -> bool {
        self.state
            .compare_exchange(STATE_IDLE, STATE_BUSY, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Deliver a batch: send, classify, maybe retry once.
    pub async fn deliver(&self, batch: EventBatch) {
        match self.attempt(&batch).await {
            Outcome::Success(server_time) => self.finish_success(server_time),
            Outcome::Permanent(status) => self.finish_permanent(status),
            Outcome::Recoverable => {
                tokio::time::sleep(self.retry_delay).await;
                match self.attempt(&batch).await {
                    Outcome::Success(server_time) => self.finish_success(server_time),
                    Outcome::Permanent(status) => self.finish_permanent(status),
                    Outcome::Recoverable => {
                        // No third attempt; the payload is dropped.
                        warn!("dropping event payload after two failed delivery attempts");
                        self.state.store(STATE_IDLE, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    fn finish_success(&self, server_time: Option<DateTime<Utc>>) {
        debug!("successfully delivered events");
        if let Some(time) = server_time {
            (self.server_time)(time);
        }
        self.state.store(STATE_IDLE, Ordering::SeqCst);
    }

    fn finish_permanent(&self, status: u16) {
        self.state.store(STATE_FAILED, Ordering::SeqCst);
        (self.permanent_failure)(status);
    }

    async fn attempt(&self, batch: &EventBatch) -> Outcome {
        let response = self
            .client
            .post(&batch.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("X-LaunchDarkly-Event-Schema", "4")
            .header("X-LaunchDarkly-Payload-Id", &batch.payload_id)
            .body(batch.body.clone())
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("event delivery attempt failed: {err}");
                return Outcome::Recoverable;
            }
        };

        let status = response.status().as_u16();
        if response.status().is_success() {
            let server_time = response
                .headers()
                .get(reqwest::header::DATE)
                .and_then(|v| v.to_str().ok())
                .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
                .map(|dt| dt.with_timezone(&Utc));
            return Outcome::Success(server_time);
        }
        if is_recoverable_status(status) {
            warn!(status, "event delivery attempt failed; will retry");
            Outcome::Recoverable
        } else {
            Outcome::Permanent(status)
        }
    }
}

/// Delivery retry classification: bad-request, timeout, rate-limit and
/// server errors may be retried; authorization and payload failures are
/// permanent.
fn is_recoverable_status(status: u16) -> bool {
    matches!(status, 400 | 408 | 429) || status >= 500
}
