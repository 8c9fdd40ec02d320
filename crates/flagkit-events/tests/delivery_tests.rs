// SPDX-License-Identifier: MIT OR Apache-2.0
//! Delivery-worker state machine against a mock event service.

use chrono::{TimeZone, Utc};
use flagkit_events::worker::WorkerStatus;
use flagkit_events::{DeliveryWorker, EventBatch, WorkerPool};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn batch(url: &str) -> EventBatch {
    EventBatch {
        url: format!("{url}/bulk"),
        body: "[]".into(),
        payload_id: "payload-1".into(),
    }
}

struct SequenceResponder {
    responses: Vec<ResponseTemplate>,
    calls: AtomicUsize,
}

impl SequenceResponder {
    fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            calls: AtomicUsize::new(0),
        }
    }
}

impl Respond for SequenceResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .get(index)
            .cloned()
            .unwrap_or_else(|| ResponseTemplate::new(200))
    }
}

#[tokio::test]
async fn recoverable_then_success_retries_once_and_reports_server_time() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(429),
            ResponseTemplate::new(200).insert_header("Date", "Tue, 21 May 2024 12:00:00 GMT"),
        ]))
        .mount(&server)
        .await;

    let times = Arc::new(Mutex::new(Vec::new()));
    let sink = times.clone();
    let worker = DeliveryWorker::new(
        reqwest::Client::new(),
        Duration::from_millis(100),
        Arc::new(move |t| sink.lock().unwrap().push(t)),
        Arc::new(|_| panic!("should not fail permanently")),
    );

    let started = Instant::now();
    worker.deliver(batch(&server.uri())).await;

    // Two requests with the same payload id, spaced by the retry delay.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0].headers.get("X-LaunchDarkly-Payload-Id"),
        requests[1].headers.get("X-LaunchDarkly-Payload-Id"),
    );
    assert!(started.elapsed() >= Duration::from_millis(100));

    assert_eq!(worker.status(), WorkerStatus::Idle);
    let times = times.lock().unwrap();
    assert_eq!(times.len(), 1);
    assert_eq!(
        times[0],
        Utc.with_ymd_and_hms(2024, 5, 21, 12, 0, 0).unwrap()
    );
}

#[tokio::test]
async fn recoverable_then_permanent_fails_the_worker() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(429),
            ResponseTemplate::new(401),
        ]))
        .mount(&server)
        .await;

    let failures = Arc::new(Mutex::new(Vec::new()));
    let sink = failures.clone();
    let worker = DeliveryWorker::new(
        reqwest::Client::new(),
        Duration::from_millis(10),
        Arc::new(|_| {}),
        Arc::new(move |status| sink.lock().unwrap().push(status)),
    );

    worker.deliver(batch(&server.uri())).await;

    assert_eq!(worker.status(), WorkerStatus::PermanentlyFailed);
    assert_eq!(*failures.lock().unwrap(), vec![401]);
}

#[tokio::test]
async fn two_recoverable_failures_drop_the_payload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(SequenceResponder::new(vec![
            ResponseTemplate::new(503),
            ResponseTemplate::new(503),
        ]))
        .mount(&server)
        .await;

    let worker = DeliveryWorker::new(
        reqwest::Client::new(),
        Duration::from_millis(10),
        Arc::new(|_| {}),
        Arc::new(|_| panic!("recoverable failures are not permanent")),
    );

    worker.deliver(batch(&server.uri())).await;

    // Exactly two attempts, then the payload is dropped.
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
    assert_eq!(worker.status(), WorkerStatus::Idle);
}

#[tokio::test]
async fn pool_reports_permanent_failure_exactly_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/bulk"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let count = Arc::new(AtomicUsize::new(0));
    let sink = count.clone();
    let pool = WorkerPool::new(
        reqwest::Client::new(),
        2,
        Duration::from_millis(10),
        Arc::new(|_| {}),
        Some(Arc::new(move |_| {
            sink.fetch_add(1, Ordering::SeqCst);
        })),
    );

    let first = pool.acquire().unwrap();
    let second = pool.acquire().unwrap();
    first.deliver(batch(&server.uri())).await;
    second.deliver(batch(&server.uri())).await;

    assert_eq!(count.load(Ordering::SeqCst), 1);
    // Failed workers are never handed out again.
    assert!(pool.acquire().is_none());
}

#[tokio::test]
async fn acquire_skips_busy_workers() {
    let pool = WorkerPool::new(
        reqwest::Client::new(),
        2,
        Duration::from_millis(10),
        Arc::new(|_| {}),
        None,
    );
    let first = pool.acquire().unwrap();
    assert_eq!(first.status(), WorkerStatus::Busy);
    let second = pool.acquire().unwrap();
    assert_eq!(second.status(), WorkerStatus::Busy);
    assert!(pool.acquire().is_none());
}
