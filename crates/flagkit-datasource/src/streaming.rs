// SPDX-License-Identifier: MIT OR Apache-2.0
//! The SSE streaming data source.

use crate::http;
use crate::protocol::StreamEventHandler;
use crate::sse::SseDecoder;
use crate::status::{DataSourceState, DataSourceStatusManager, ErrorKind};
use flagkit_config::{HttpConfig, ServiceEndpoints, StreamingConfig};
use flagkit_store::Destination;
use futures::StreamExt;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{debug, error, warn};

/// Ceiling on the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// A connection healthy for this long resets the backoff.
const BACKOFF_RESET_AFTER: Duration = Duration::from_secs(60);
/// Read-silence watchdog; must exceed the service's heartbeat interval.
const READ_TIMEOUT: Duration = Duration::from_secs(300);

enum ConnectOutcome {
    Retry,
    Fatal,
    Shutdown,
}

/// Maintains a streaming connection to the control plane, applying `put`,
/// `patch`, and `delete` messages to its destination.
pub struct StreamingDataSource {
    url: String,
    client: reqwest::Client,
    handler: StreamEventHandler,
    status: Arc<DataSourceStatusManager>,
    initial_reconnect_delay: Duration,
    shutdown: watch::Receiver<bool>,
}

impl StreamingDataSource {
    /// Assemble a streaming source.
    ///
    /// `headers` must already carry authorization; `shutdown` flips to
    /// `true` when the owner is closing.
    pub fn new(
        config: &StreamingConfig,
        endpoints: &ServiceEndpoints,
        http_config: &HttpConfig,
        headers: HeaderMap,
        destination: Arc<dyn Destination>,
        status: Arc<DataSourceStatusManager>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, reqwest::Error> {
        // The watchdog owns read timing; the client itself must not time
        // out in-between heartbeats.
        let client = http::build_client(http_config, headers, None)?;
        Ok(Self {
            url: http::join_url(&endpoints.streaming_base_url, &config.streaming_path),
            client,
            handler: StreamEventHandler::new(destination, status.clone()),
            status,
            initial_reconnect_delay: config.initial_reconnect_delay,
            shutdown,
        })
    }

    /// Drive the connect/read/reconnect loop until shutdown or a permanent
    /// failure.
    pub async fn run(mut self) {
        self.status.set_state(DataSourceState::Initializing);
        let mut attempt: u32 = 0;
        loop {
            if *self.shutdown.borrow() {
                return;
            }
            match self.connect_and_read(&mut attempt).await {
                ConnectOutcome::Shutdown => return,
                ConnectOutcome::Fatal => return,
                ConnectOutcome::Retry => {
                    attempt += 1;
                    let delay = self.backoff_delay(attempt);
                    debug!(attempt, ?delay, "stream disconnected; will reconnect");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => return,
                    }
                }
            }
        }
    }

    async fn connect_and_read(&mut self, attempt: &mut u32) -> ConnectOutcome {
        let request = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");

        let response = tokio::select! {
            response = request.send() => response,
            _ = self.shutdown.changed() => return ConnectOutcome::Shutdown,
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("streaming connection failed: {err}");
                self.status.set_state_with_error(
                    DataSourceState::Interrupted,
                    ErrorKind::NetworkError,
                    &err.to_string(),
                );
                return ConnectOutcome::Retry;
            }
        };

        let status_code = response.status().as_u16();
        if !response.status().is_success() {
            if http::is_recoverable_status(status_code) {
                self.status.set_state_with_status_code(
                    DataSourceState::Interrupted,
                    status_code,
                    "streaming request failed; will retry",
                );
                return ConnectOutcome::Retry;
            }
            error!(status = status_code, "streaming request failed permanently");
            self.status.set_state_with_status_code(
                DataSourceState::Off,
                status_code,
                "streaming request failed permanently",
            );
            return ConnectOutcome::Fatal;
        }

        let connected_at = Instant::now();
        let mut decoder = SseDecoder::new();
        let mut body = Box::pin(response.bytes_stream());

        loop {
            let next = tokio::select! {
                next = tokio::time::timeout(READ_TIMEOUT, body.next()) => next,
                _ = self.shutdown.changed() => return ConnectOutcome::Shutdown,
            };
            match next {
                Err(_elapsed) => {
                    warn!("no data from stream within watchdog interval; reconnecting");
                    self.status.set_state_with_error(
                        DataSourceState::Interrupted,
                        ErrorKind::NetworkError,
                        "stream went silent",
                    );
                    return ConnectOutcome::Retry;
                }
                Ok(None) => {
                    self.status.set_state_with_error(
                        DataSourceState::Interrupted,
                        ErrorKind::NetworkError,
                        "stream closed by server",
                    );
                    return ConnectOutcome::Retry;
                }
                Ok(Some(Err(err))) => {
                    self.status.set_state_with_error(
                        DataSourceState::Interrupted,
                        ErrorKind::NetworkError,
                        &err.to_string(),
                    );
                    return ConnectOutcome::Retry;
                }
                Ok(Some(Ok(chunk))) => {
                    for event in decoder.feed(&String::from_utf8_lossy(&chunk)) {
                        self.handler.handle_message(&event.event_type, &event.data);
                    }
                    if connected_at.elapsed() >= BACKOFF_RESET_AFTER {
                        *attempt = 0;
                    }
                }
            }
        }
    }

    /// Exponential backoff with deterministic jitter in `[0.5, 1.0)` of
    /// the nominal delay, derived from the attempt counter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let doubled = self
            .initial_reconnect_delay
            .saturating_mul(1_u32 << attempt.saturating_sub(1).min(16));
        let nominal = doubled.min(MAX_RECONNECT_DELAY);
        let hashed = attempt.wrapping_mul(2_654_435_761) >> 16;
        let factor = 0.5 + f64::from(hashed % 1000) / 2000.0;
        nominal.mul_f64(factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let (_tx, rx) = watch::channel(false);
        let source = StreamingDataSource::new(
            &StreamingConfig {
                initial_reconnect_delay: Duration::from_secs(1),
                streaming_path: "/all".into(),
            },
            &ServiceEndpoints::default(),
            &HttpConfig::default(),
            HeaderMap::new(),
            Arc::new(flagkit_store::MemoryStore::new()),
            Arc::new(DataSourceStatusManager::new()),
            rx,
        )
        .unwrap();

        for attempt in 1..10 {
            let delay = source.backoff_delay(attempt);
            assert!(delay >= Duration::from_millis(500), "attempt {attempt}");
            assert!(delay <= MAX_RECONNECT_DELAY, "attempt {attempt}");
        }
        // Deterministic: same attempt, same delay.
        assert_eq!(source.backoff_delay(3), source.backoff_delay(3));
    }
}
