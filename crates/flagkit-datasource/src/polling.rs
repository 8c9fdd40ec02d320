// SPDX-License-Identifier: MIT OR Apache-2.0
//! The timer-driven polling data source.

use crate::http;
use crate::status::{DataSourceState, DataSourceStatusManager, ErrorKind};
use flagkit_config::{HttpConfig, PollingConfig, ServiceEndpoints};
use flagkit_core::DataSet;
use flagkit_store::Destination;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{error, warn};

const ERROR_PARSING_POLL: &str = "could not parse polling payload";

enum PollOutcome {
    Continue,
    Stop,
}

/// Fetches the full ruleset on a fixed interval, honoring `ETag` /
/// `If-None-Match` so unchanged payloads cost one round trip and no
/// re-initialization.
pub struct PollingDataSource {
    url: String,
    client: reqwest::Client,
    destination: Arc<dyn Destination>,
    status: Arc<DataSourceStatusManager>,
    interval: Duration,
    etag: Option<String>,
    shutdown: watch::Receiver<bool>,
}

impl PollingDataSource {
    /// Assemble a polling source. An interval shorter than the configured
    /// minimum is raised to it with a warning.
    pub fn new(
        config: &PollingConfig,
        endpoints: &ServiceEndpoints,
        http_config: &HttpConfig,
        headers: HeaderMap,
        destination: Arc<dyn Destination>,
        status: Arc<DataSourceStatusManager>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, reqwest::Error> {
        let client = http::build_client(http_config, headers, Some(http_config.read_timeout))?;
        let mut interval = config.interval;
        if interval < config.min_interval {
            warn!(
                "polling interval too frequent; raising to {} seconds",
                config.min_interval.as_secs()
            );
            interval = config.min_interval;
        }
        Ok(Self {
            url: http::join_url(&endpoints.polling_base_url, &config.polling_path),
            client,
            destination,
            status,
            interval,
            etag: None,
            shutdown,
        })
    }

    /// Drive the poll loop until shutdown or a permanent failure.
    pub async fn run(mut self) {
        self.status.set_state(DataSourceState::Initializing);
        loop {
            if *self.shutdown.borrow() {
                return;
            }
            let started = Instant::now();
            match self.poll_once().await {
                PollOutcome::Stop => return,
                PollOutcome::Continue => {}
            }
            // Schedule relative to the poll's start so intervals do not
            // accumulate drift.
            let delay = self.interval.saturating_sub(started.elapsed());
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => return,
            }
        }
    }

    async fn poll_once(&mut self) -> PollOutcome {
        let mut request = self.client.get(&self.url);
        if let Some(etag) = &self.etag {
            request = request.header(reqwest::header::IF_NONE_MATCH, etag.clone());
        }

        let response = tokio::select! {
            response = request.send() => response,
            _ = self.shutdown.changed() => return PollOutcome::Stop,
        };

        let response = match response {
            Ok(response) => response,
            Err(err) => {
                warn!("polling for flag updates failed: {err}");
                self.status.set_state_with_error(
                    DataSourceState::Interrupted,
                    ErrorKind::NetworkError,
                    &err.to_string(),
                );
                return PollOutcome::Continue;
            }
        };

        let status_code = response.status().as_u16();
        let etag = response
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);

        // An unchanged ETag means unchanged content; skip straight to the
        // next interval without touching the store.
        if let (Some(previous), Some(current)) = (&self.etag, &etag) {
            if previous == current {
                return PollOutcome::Continue;
            }
        }
        if let Some(etag) = etag {
            self.etag = Some(etag);
        }

        match status_code {
            200..=299 => {
                let body = tokio::select! {
                    body = response.text() => body,
                    _ = self.shutdown.changed() => return PollOutcome::Stop,
                };
                let body = match body {
                    Ok(body) => body,
                    Err(err) => {
                        self.status.set_state_with_error(
                            DataSourceState::Interrupted,
                            ErrorKind::NetworkError,
                            &err.to_string(),
                        );
                        return PollOutcome::Continue;
                    }
                };
                if body.is_empty() {
                    self.status.set_state_with_error(
                        DataSourceState::Interrupted,
                        ErrorKind::Unknown,
                        "polling response contained no body",
                    );
                    return PollOutcome::Continue;
                }
                match serde_json::from_str::<DataSet>(&body) {
                    Ok(data) => {
                        self.destination.init(data);
                        self.status.set_state(DataSourceState::Valid);
                    }
                    Err(err) => {
                        error!("{ERROR_PARSING_POLL}: {err}");
                        self.status.set_state_with_error(
                            DataSourceState::Interrupted,
                            ErrorKind::InvalidData,
                            ERROR_PARSING_POLL,
                        );
                    }
                }
                PollOutcome::Continue
            }
            304 => PollOutcome::Continue,
            status if http::is_recoverable_status(status) => {
                self.status.set_state_with_status_code(
                    DataSourceState::Interrupted,
                    status,
                    "polling request failed; will retry",
                );
                PollOutcome::Continue
            }
            status => {
                error!(status, "polling request failed permanently; giving up");
                self.status.set_state_with_status_code(
                    DataSourceState::Off,
                    status,
                    "polling request failed permanently",
                );
                PollOutcome::Stop
            }
        }
    }
}
