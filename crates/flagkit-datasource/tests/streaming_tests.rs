// SPDX-License-Identifier: MIT OR Apache-2.0
//! Streaming source behavior against a mock SSE service.

use flagkit_config::{HttpConfig, ServiceEndpoints, StreamingConfig};
use flagkit_datasource::streaming::StreamingDataSource;
use flagkit_datasource::{DataSourceState, DataSourceStatusManager};
use flagkit_store::{MemoryStore, Store};
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const SSE_BODY: &str = concat!(
    "event: put\n",
    "data: {\"path\":\"/\",\"data\":{\"flags\":{\"flagX\":",
    "{\"key\":\"flagX\",\"version\":10,\"on\":true,",
    "\"variations\":[true,false],\"fallthrough\":{\"variation\":0}}},",
    "\"segments\":{}}}\n",
    "\n",
    "event: delete\n",
    "data: {\"path\":\"/flags/flagX\",\"version\":11}\n",
    "\n",
);

fn source_against(
    server_uri: &str,
    store: Arc<MemoryStore>,
    status: Arc<DataSourceStatusManager>,
) -> (StreamingDataSource, watch::Sender<bool>) {
    let (tx, rx) = watch::channel(false);
    let source = StreamingDataSource::new(
        &StreamingConfig {
            initial_reconnect_delay: Duration::from_millis(10),
            streaming_path: "/all".into(),
        },
        &ServiceEndpoints::relay_proxy(server_uri),
        &HttpConfig::default(),
        HeaderMap::new(),
        store,
        status,
        rx,
    )
    .unwrap();
    (source, tx)
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

#[tokio::test]
async fn put_then_delete_leaves_a_tombstone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/all"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let status = Arc::new(DataSourceStatusManager::new());
    let (source, shutdown) = source_against(&server.uri(), store.clone(), status.clone());
    let task = tokio::spawn(source.run());

    wait_until(|| store.get_flag("flagX").is_some_and(|d| !d.is_present())).await;
    let descriptor = store.get_flag("flagX").unwrap();
    assert_eq!(descriptor.version, 11);
    assert!(store.initialized());

    let _ = shutdown.send(true);
    let _ = task.await;
}

#[tokio::test]
async fn stream_end_reconnects_and_reapplies() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/all"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(SSE_BODY, "text/event-stream"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let status = Arc::new(DataSourceStatusManager::new());
    let (source, shutdown) = source_against(&server.uri(), store.clone(), status);
    let task = tokio::spawn(source.run());

    // The mock body ends immediately after the events, so the source
    // reconnects; more than one request proves the retry loop ran.
    wait_until(|| store.initialized()).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(server.received_requests().await.unwrap().len() > 1);

    let _ = shutdown.send(true);
    let _ = task.await;
}

#[tokio::test]
async fn unauthorized_stream_goes_permanently_off() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/all"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let status = Arc::new(DataSourceStatusManager::new());
    let (source, _shutdown) = source_against(&server.uri(), store, status.clone());
    let task = tokio::spawn(source.run());

    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("streaming loop should terminate")
        .unwrap();
    let observed = status.status();
    assert_eq!(observed.state, DataSourceState::Off);
    assert_eq!(observed.last_error.unwrap().status_code, Some(401));
}
