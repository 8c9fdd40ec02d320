// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use flagkit_core::AttributeRef;
use flagkit_store::SerializedDataReader;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// A configuration problem detected at construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The SDK key is required and must be non-empty.
    #[error("SDK key must not be empty")]
    EmptySdkKey,
    /// A service base URL failed basic validation.
    #[error("invalid service endpoint {0:?}")]
    InvalidEndpoint(String),
    /// The event outbox capacity must be non-zero.
    #[error("event capacity must be greater than zero")]
    ZeroEventCapacity,
}

/// Base URLs of the control-plane services.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceEndpoints {
    /// Base URL of the SSE streaming service.
    pub streaming_base_url: String,
    /// Base URL of the polling service.
    pub polling_base_url: String,
    /// Base URL of the analytics event service.
    pub events_base_url: String,
}

impl Default for ServiceEndpoints {
    fn default() -> Self {
        Self {
            streaming_base_url: "https://stream.flagkit.io".to_owned(),
            polling_base_url: "https://sdk.flagkit.io".to_owned(),
            events_base_url: "https://events.flagkit.io".to_owned(),
        }
    }
}

impl ServiceEndpoints {
    /// Point every service at one host; the shape used by test harnesses
    /// and relay proxies.
    pub fn relay_proxy(base: &str) -> Self {
        let base = base.trim_end_matches('/').to_owned();
        Self {
            streaming_base_url: base.clone(),
            polling_base_url: base.clone(),
            events_base_url: base,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for url in [
            &self.streaming_base_url,
            &self.polling_base_url,
            &self.events_base_url,
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidEndpoint(url.clone()));
            }
        }
        Ok(())
    }
}

/// Streaming data-source tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamingConfig {
    /// Delay before the first reconnect attempt; doubles per attempt up to
    /// an internal cap.
    pub initial_reconnect_delay: Duration,
    /// Path of the streaming endpoint, joined onto the streaming base URL.
    pub streaming_path: String,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            initial_reconnect_delay: Duration::from_secs(1),
            streaming_path: "/all".to_owned(),
        }
    }
}

/// Polling data-source tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollingConfig {
    /// Requested interval between polls; clamped up to `min_interval`.
    pub interval: Duration,
    /// Path of the polling endpoint, joined onto the polling base URL.
    pub polling_path: String,
    /// Lower bound on the polling interval.
    pub min_interval: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            polling_path: "/sdk/latest-all".to_owned(),
            min_interval: Duration::from_secs(30),
        }
    }
}

/// How the background-sync system receives updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncMethod {
    /// Server-sent-events push.
    Streaming(StreamingConfig),
    /// Periodic polling.
    Polling(PollingConfig),
}

impl Default for SyncMethod {
    fn default() -> Self {
        SyncMethod::Streaming(StreamingConfig::default())
    }
}

/// Lazy-load system configuration: an external serialized reader plus the
/// cache TTL.
#[derive(Clone)]
pub struct LazyLoadConfig {
    /// The external store adapter.
    pub source: Arc<dyn SerializedDataReader>,
    /// How long a cached item stays fresh.
    pub refresh_ttl: Duration,
}

impl fmt::Debug for LazyLoadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyLoadConfig")
            .field("source", &self.source.identity())
            .field("refresh_ttl", &self.refresh_ttl)
            .finish()
    }
}

/// Which data system maintains the local ruleset.
#[derive(Clone, Debug)]
pub enum DataSystemConfig {
    /// Continuously synchronized in-memory store (the default).
    BackgroundSync(SyncMethod),
    /// On-demand reads through a TTL cache in front of an external store.
    LazyLoad(LazyLoadConfig),
    /// No data system at all; every evaluation serves defaults.
    Disabled,
}

impl Default for DataSystemConfig {
    fn default() -> Self {
        DataSystemConfig::BackgroundSync(SyncMethod::default())
    }
}

impl DataSystemConfig {
    /// Background sync using streaming with default tuning.
    pub fn streaming() -> Self {
        DataSystemConfig::BackgroundSync(SyncMethod::Streaming(StreamingConfig::default()))
    }

    /// Background sync using polling with default tuning.
    pub fn polling() -> Self {
        DataSystemConfig::BackgroundSync(SyncMethod::Polling(PollingConfig::default()))
    }
}

/// Event pipeline tuning.
#[derive(Clone, Debug, PartialEq)]
pub struct EventsConfig {
    /// Master switch for analytics events.
    pub enabled: bool,
    /// Outbox capacity; overflow is dropped with a one-shot warning.
    pub capacity: usize,
    /// Interval between automatic flushes.
    pub flush_interval: Duration,
    /// Redact every context attribute in event output.
    pub all_attributes_private: bool,
    /// Specific attribute references to redact in event output.
    pub private_attributes: Vec<AttributeRef>,
    /// Interval at which the seen-context-keys set resets (controls
    /// `index` event deduplication).
    pub context_keys_flush_interval: Duration,
    /// Number of delivery workers.
    pub workers: usize,
    /// Delay between a failed delivery and its single retry.
    pub delivery_retry_delay: Duration,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            flush_interval: Duration::from_secs(5),
            all_attributes_private: false,
            private_attributes: Vec::new(),
            context_keys_flush_interval: Duration::from_secs(300),
            workers: 5,
            delivery_retry_delay: Duration::from_secs(1),
        }
    }
}

/// TLS peer-verification behavior.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PeerVerifyMode {
    /// Verify the peer certificate (the default).
    #[default]
    VerifyPeer,
    /// Skip verification; only for test harnesses.
    VerifyNone,
}

/// TLS options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TlsConfig {
    /// Peer verification mode.
    pub peer_verify_mode: PeerVerifyMode,
    /// Path to an additional CA bundle.
    pub custom_ca_file: Option<String>,
}

/// HTTP properties shared by every connection the SDK makes.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpConfig {
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Read timeout for plain requests (the streaming source manages its
    /// own, longer read timeout).
    pub read_timeout: Duration,
    /// Write timeout.
    pub write_timeout: Duration,
    /// Name of a wrapping SDK, if any, for the user-agent tag.
    pub wrapper_name: Option<String>,
    /// Version of the wrapping SDK.
    pub wrapper_version: Option<String>,
    /// Extra headers applied to every request.
    pub base_headers: Vec<(String, String)>,
    /// TLS options.
    pub tls: TlsConfig,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            wrapper_name: None,
            wrapper_version: None,
            base_headers: Vec::new(),
            tls: TlsConfig::default(),
        }
    }
}

/// Log verbosity levels recognized by the logging section.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LogLevel {
    /// Most verbose.
    Debug,
    /// Default.
    #[default]
    Info,
    /// Warnings and errors only.
    Warn,
    /// Errors only.
    Error,
}

/// Logging options. flagkit emits through `tracing`; these options control
/// the tag attached to SDK events and let embedders silence the SDK
/// entirely.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Drop all SDK log output.
    pub disable_logging: bool,
    /// Minimum level the SDK emits at.
    pub level: LogLevel,
    /// Tag identifying this SDK instance in shared log streams.
    pub tag: Option<String>,
}

/// Application metadata propagated as a tags header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AppInfo {
    /// Application identifier (e.g. service name).
    pub identifier: Option<String>,
    /// Application version.
    pub version: Option<String>,
}

impl AppInfo {
    /// Render as the `X-LaunchDarkly-Tags` header value; `None` when no
    /// fields are set or values contain invalid characters.
    pub fn as_tag_value(&self) -> Option<String> {
        fn valid(v: &str) -> bool {
            !v.is_empty()
                && v.len() <= 64
                && v.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_'))
        }
        let mut parts = Vec::new();
        if let Some(id) = self.identifier.as_deref().filter(|v| valid(v)) {
            parts.push(format!("application-id/{id}"));
        }
        if let Some(version) = self.version.as_deref().filter(|v| valid(v)) {
            parts.push(format!("application-version/{version}"));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// The complete, validated SDK configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// The SDK credential sent as the `Authorization` header.
    pub sdk_key: String,
    /// Run with no network activity at all.
    pub offline: bool,
    /// Control-plane base URLs.
    pub service_endpoints: ServiceEndpoints,
    /// Data-system selection.
    pub data_system: DataSystemConfig,
    /// Event pipeline tuning.
    pub events: EventsConfig,
    /// Shared HTTP properties.
    pub http: HttpConfig,
    /// Logging options.
    pub logging: LoggingConfig,
    /// Application metadata.
    pub app_info: AppInfo,
}

impl Config {
    /// A configuration with defaults for everything but the SDK key.
    pub fn new(sdk_key: impl Into<String>) -> Self {
        Self {
            sdk_key: sdk_key.into(),
            ..Self::default()
        }
    }

    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sdk_key.is_empty() && !self.offline {
            return Err(ConfigError::EmptySdkKey);
        }
        self.service_endpoints.validate()?;
        if self.events.enabled && self.events.capacity == 0 {
            return Err(ConfigError::ZeroEventCapacity);
        }
        Ok(())
    }
}
