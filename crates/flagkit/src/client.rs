// SPDX-License-Identifier: MIT OR Apache-2.0
//! The client orchestrator: data system + evaluator + event pipeline.

use crate::all_flags::{AllFlagsState, AllFlagsStateOptions, FlagState};
use crate::event_factory::EventFactory;
use flagkit_config::{Config, ConfigError, DataSystemConfig};
use flagkit_core::{Context, ErrorKind, EvaluationDetail, Value};
use flagkit_datasource::http as sdk_http;
use flagkit_datasource::{
    BackgroundSync, DataSourceState, DataSourceStatus, DataSourceStatusManager, DataSystem,
    LazyLoad, OfflineSystem, StatusListenerHandle,
};
use flagkit_eval::{Evaluator, NoopPrerequisiteSink, PrerequisiteEvaluation, PrerequisiteEventSink};
use flagkit_events::EventProcessor;
use flagkit_store::{FlagChangeSet, ListenerHandle, Store};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Destructor-triggered shutdown waits at most this long for I/O to
/// quiesce.
const DROP_SHUTDOWN_WAIT: Duration = Duration::from_millis(100);

/// A failure constructing the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The I/O runtime could not be created.
    #[error("could not create I/O runtime: {0}")]
    Runtime(#[from] std::io::Error),
    /// An HTTP client could not be constructed.
    #[error("could not construct HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// The flagkit client.
///
/// Owns a single-worker I/O runtime on which the data source and the
/// event pipeline run; evaluation itself happens synchronously on the
/// calling thread against shared ruleset snapshots.
pub struct Client {
    runtime: Option<tokio::runtime::Runtime>,
    status: Arc<DataSourceStatusManager>,
    data_system: Arc<dyn DataSystem>,
    store_view: Arc<dyn Store>,
    background: Option<Arc<BackgroundSync>>,
    events: Option<EventProcessor>,
    events_default: EventFactory,
    events_with_reasons: EventFactory,
}

impl Client {
    /// Construct a client from a validated configuration. Nothing runs
    /// until [`start`](Client::start).
    pub fn build(config: Config) -> Result<Self, ClientError> {
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("flagkit-io")
            .enable_all()
            .build()?;

        let status = Arc::new(DataSourceStatusManager::new());

        let mut extra_headers = config.http.base_headers.clone();
        if let Some(tags) = config.app_info.as_tag_value() {
            extra_headers.push(("X-LaunchDarkly-Tags".to_owned(), tags));
        }
        if let Some(wrapper) = &config.http.wrapper_name {
            let value = match &config.http.wrapper_version {
                Some(version) => format!("{wrapper}/{version}"),
                None => wrapper.clone(),
            };
            extra_headers.push(("X-LaunchDarkly-Wrapper".to_owned(), value));
        }
        let headers = sdk_http::base_headers(&config.sdk_key, &extra_headers);

        let offline = config.offline;
        let (data_system, store_view, background): (
            Arc<dyn DataSystem>,
            Arc<dyn Store>,
            Option<Arc<BackgroundSync>>,
        ) = if offline || matches!(config.data_system, DataSystemConfig::Disabled) {
            let system = Arc::new(OfflineSystem::new(status.clone()));
            (system.clone(), system, None)
        } else {
            match &config.data_system {
                DataSystemConfig::BackgroundSync(method) => {
                    let system = Arc::new(BackgroundSync::new(
                        method.clone(),
                        config.service_endpoints.clone(),
                        config.http.clone(),
                        headers.clone(),
                        status.clone(),
                    ));
                    (system.clone(), system.clone(), Some(system))
                }
                DataSystemConfig::LazyLoad(lazy) => {
                    let system = Arc::new(LazyLoad::new(
                        lazy.source.clone(),
                        lazy.refresh_ttl,
                        status.clone(),
                    ));
                    (system.clone(), system, None)
                }
                DataSystemConfig::Disabled => unreachable!("handled above"),
            }
        };
        debug!(data_system = %data_system.identity(), "assembled data system");

        let events = (config.events.enabled && !offline)
            .then(|| -> Result<EventProcessor, ClientError> {
                let client =
                    sdk_http::build_client(&config.http, headers, Some(config.http.read_timeout))?;
                let url = sdk_http::join_url(&config.service_endpoints.events_base_url, "/bulk");
                Ok(EventProcessor::start(
                    config.events.clone(),
                    url,
                    client,
                    runtime.handle(),
                    None,
                    None,
                ))
            })
            .transpose()?;

        Ok(Self {
            runtime: Some(runtime),
            status,
            data_system,
            store_view,
            background,
            events,
            events_default: EventFactory::without_reasons(),
            events_with_reasons: EventFactory::with_reasons(),
        })
    }

    /// Start the data system. Returns immediately; readiness is observed
    /// via [`wait_for_initialization`](Client::wait_for_initialization)
    /// or the status listeners.
    pub fn start(&self) {
        if let Some(runtime) = &self.runtime {
            self.data_system.initialize(runtime.handle());
        }
    }

    /// Block until the data system has ingested a ruleset, gone
    /// permanently off, or the timeout elapsed. Returns
    /// [`initialized`](Client::initialized) at that moment.
    pub fn wait_for_initialization(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let (tx, rx) = std::sync::mpsc::channel::<()>();
        let _listener = self.status.on_status_change(move |_| {
            let _ = tx.send(());
        });

        loop {
            if self.data_system.initialized() {
                return true;
            }
            let state = self.status.status().state;
            if matches!(state, DataSourceState::Off | DataSourceState::SetOffline) {
                return self.data_system.initialized();
            }
            let now = Instant::now();
            if now >= deadline {
                return self.data_system.initialized();
            }
            // Wake on the next status change, or when the deadline hits.
            let _ = rx.recv_timeout(deadline - now);
        }
    }

    /// True once the data system has a usable ruleset.
    pub fn initialized(&self) -> bool {
        self.data_system.initialized()
    }

    /// The data source's current status.
    pub fn data_source_status(&self) -> DataSourceStatus {
        self.status.status()
    }

    /// Listen for data-source status changes.
    pub fn on_data_source_status_change(
        &self,
        listener: impl Fn(DataSourceStatus) + Send + Sync + 'static,
    ) -> StatusListenerHandle {
        self.status.on_status_change(listener)
    }

    /// Listen for flag changes. Returns `None` in lazy-load or offline
    /// modes, where no change stream exists.
    pub fn on_flag_change(
        &self,
        listener: impl Fn(&FlagChangeSet) + Send + Sync + 'static,
    ) -> Option<ListenerHandle> {
        self.background
            .as_ref()
            .map(|background| background.on_flag_change(listener))
    }

    /// Evaluate a boolean flag.
    pub fn bool_variation(&self, context: &Context, flag_key: &str, default: bool) -> bool {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::Bool(default),
            self.events_default,
        );
        detail.value.as_bool().unwrap_or(default)
    }

    /// Evaluate a boolean flag with full detail.
    pub fn bool_variation_detail(
        &self,
        context: &Context,
        flag_key: &str,
        default: bool,
    ) -> EvaluationDetail<bool> {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::Bool(default),
            self.events_with_reasons,
        );
        typed_detail(detail, default, Value::as_bool)
    }

    /// Evaluate a string flag.
    pub fn string_variation(&self, context: &Context, flag_key: &str, default: &str) -> String {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::from(default),
            self.events_default,
        );
        match detail.value {
            Value::String(s) => s,
            _ => default.to_owned(),
        }
    }

    /// Evaluate a string flag with full detail.
    pub fn string_variation_detail(
        &self,
        context: &Context,
        flag_key: &str,
        default: &str,
    ) -> EvaluationDetail<String> {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::from(default),
            self.events_with_reasons,
        );
        typed_detail(detail, default.to_owned(), |v| {
            v.as_str().map(str::to_owned)
        })
    }

    /// Evaluate a numeric flag as a double.
    pub fn double_variation(&self, context: &Context, flag_key: &str, default: f64) -> f64 {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::Number(default),
            self.events_default,
        );
        detail.value.as_f64().unwrap_or(default)
    }

    /// Evaluate a numeric flag as a double, with full detail.
    pub fn double_variation_detail(
        &self,
        context: &Context,
        flag_key: &str,
        default: f64,
    ) -> EvaluationDetail<f64> {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::Number(default),
            self.events_with_reasons,
        );
        typed_detail(detail, default, Value::as_f64)
    }

    /// Evaluate a numeric flag as an integer.
    pub fn int_variation(&self, context: &Context, flag_key: &str, default: i64) -> i64 {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::from(default),
            self.events_default,
        );
        detail.value.as_f64().map(|n| n as i64).unwrap_or(default)
    }

    /// Evaluate a numeric flag as an integer, with full detail.
    pub fn int_variation_detail(
        &self,
        context: &Context,
        flag_key: &str,
        default: i64,
    ) -> EvaluationDetail<i64> {
        let detail = self.variation_internal(
            context,
            flag_key,
            Value::from(default),
            self.events_with_reasons,
        );
        typed_detail(detail, default, |v| v.as_f64().map(|n| n as i64))
    }

    /// Evaluate a flag of any JSON type.
    pub fn json_variation(&self, context: &Context, flag_key: &str, default: Value) -> Value {
        self.variation_internal(context, flag_key, default, self.events_default)
            .value
    }

    /// Evaluate a flag of any JSON type, with full detail.
    pub fn json_variation_detail(
        &self,
        context: &Context,
        flag_key: &str,
        default: Value,
    ) -> EvaluationDetail<Value> {
        self.variation_internal(context, flag_key, default, self.events_with_reasons)
    }

    /// Evaluate every flag for a context.
    pub fn all_flags_state(
        &self,
        context: &Context,
        options: AllFlagsStateOptions,
    ) -> AllFlagsState {
        if !self.initialized() {
            warn!("all_flags_state called before initialization; returning empty state");
            return AllFlagsState::invalid();
        }
        if !context.is_valid() {
            warn!("all_flags_state called with an invalid context; returning empty state");
            return AllFlagsState::invalid();
        }

        let evaluator = Evaluator::new(self.store_view.as_ref());
        let mut builder = AllFlagsState::builder();

        let all_flags = self.store_view.all_flags();
        // Evaluations may touch many segments; a single bulk read up
        // front lets the lazy-load system fetch them in one trip.
        let _ = self.store_view.all_segments();

        for (key, descriptor) in &all_flags {
            let Some(flag) = descriptor.item.as_ref() else {
                continue;
            };
            if options.client_side_only && !flag.client_side_availability.using_environment_id {
                continue;
            }

            let detail = evaluator.evaluate(flag, context, &NoopPrerequisiteSink);
            let in_experiment = flag.is_experimentation_enabled(&detail.reason);
            let track_events = flag.track_events || in_experiment;
            let omit_details = options.details_only_for_tracked_flags
                && !track_events
                && flag.debug_events_until_date.is_none();

            builder.add_flag(
                key,
                detail.value,
                FlagState {
                    version: (!omit_details).then_some(flag.version),
                    variation: detail.variation_index,
                    reason: ((options.with_reasons || in_experiment) && !omit_details)
                        .then_some(detail.reason),
                    track_events,
                    track_reason: in_experiment,
                    debug_events_until_date: flag.debug_events_until_date,
                },
            );
        }
        builder.build()
    }

    /// Report a context to the analytics pipeline.
    pub fn identify(&self, context: &Context) {
        if let Some(events) = &self.events {
            events.send(self.events_default.identify_event(context));
        }
    }

    /// Record a custom metric event.
    pub fn track(&self, context: &Context, event_name: &str) {
        self.track_internal(context, event_name, None, None);
    }

    /// Record a custom metric event with a data payload.
    pub fn track_data(&self, context: &Context, event_name: &str, data: Value) {
        self.track_internal(context, event_name, Some(data), None);
    }

    /// Record a custom metric event with a payload and a numeric value.
    pub fn track_metric(&self, context: &Context, event_name: &str, metric: f64, data: Value) {
        self.track_internal(context, event_name, Some(data), Some(metric));
    }

    fn track_internal(
        &self,
        context: &Context,
        event_name: &str,
        data: Option<Value>,
        metric: Option<f64>,
    ) {
        if let Some(events) = &self.events {
            events.send(
                self.events_default
                    .custom_event(event_name, context, data, metric),
            );
        }
    }

    /// Ask the event pipeline to flush soon.
    pub fn flush(&self) {
        if let Some(events) = &self.events {
            events.flush();
        }
    }

    /// Shut down in order: stop the data source, drain the event
    /// pipeline with one final flush, then stop the I/O runtime.
    ///
    /// Must be called from outside any async runtime.
    pub fn close(&mut self) {
        let Some(runtime) = self.runtime.take() else {
            return;
        };
        self.data_system.shutdown();
        if let Some(events) = &self.events {
            runtime.block_on(events.close());
        }
        runtime.shutdown_timeout(Duration::from_secs(2));
        info!("flagkit client closed");
    }

    fn variation_internal(
        &self,
        context: &Context,
        flag_key: &str,
        default: Value,
        factory: EventFactory,
    ) -> EvaluationDetail<Value> {
        if !self.initialized() {
            info!("client has not finished initializing; returning default value");
            let detail = EvaluationDetail::error(ErrorKind::ClientNotReady, default.clone());
            self.send_unknown(flag_key, context, &detail, default, factory);
            return detail;
        }
        if !context.is_valid() {
            warn!(flag_key, "evaluation attempted with an invalid context");
            let detail = EvaluationDetail::error(ErrorKind::UserNotSpecified, default.clone());
            self.send_unknown(flag_key, context, &detail, default, factory);
            return detail;
        }

        let descriptor = self.store_view.get_flag(flag_key);
        let flag = descriptor.as_ref().and_then(|d| d.item.as_ref());
        let Some(flag) = flag else {
            info!(flag_key, "unknown feature flag; returning default value");
            let detail = EvaluationDetail::error(ErrorKind::FlagNotFound, default.clone());
            self.send_unknown(flag_key, context, &detail, default, factory);
            return detail;
        };

        let sink = PrereqSink {
            events: self.events.as_ref(),
            factory,
        };
        let evaluator = Evaluator::new(self.store_view.as_ref());
        let raw = evaluator.evaluate(flag, context, &sink);

        // With no selected variation (an error, or off with no off
        // variation) the host default is served.
        let detail = EvaluationDetail::new(
            if raw.variation_index.is_none() {
                default.clone()
            } else {
                raw.value
            },
            raw.variation_index,
            raw.reason,
        );
        if let Some(events) = &self.events {
            events.send(factory.eval_event(flag, context, &detail, default, None));
        }
        detail
    }

    fn send_unknown(
        &self,
        flag_key: &str,
        context: &Context,
        detail: &EvaluationDetail<Value>,
        default: Value,
        factory: EventFactory,
    ) {
        if let Some(events) = &self.events {
            events.send(factory.unknown_flag_event(flag_key, context, detail, default));
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            self.data_system.shutdown();
            runtime.shutdown_timeout(DROP_SHUTDOWN_WAIT);
        }
    }
}

fn typed_detail<T>(
    detail: EvaluationDetail<Value>,
    default: T,
    cast: impl Fn(&Value) -> Option<T>,
) -> EvaluationDetail<T> {
    match cast(&detail.value) {
        Some(value) => EvaluationDetail::new(value, detail.variation_index, detail.reason),
        None => EvaluationDetail::error(ErrorKind::WrongType, default),
    }
}

struct PrereqSink<'a> {
    events: Option<&'a EventProcessor>,
    factory: EventFactory,
}

impl PrerequisiteEventSink for PrereqSink<'_> {
    fn record(&self, evaluation: PrerequisiteEvaluation<'_>) {
        if let Some(events) = self.events {
            events.send(self.factory.eval_event(
                evaluation.prerequisite_flag,
                evaluation.context,
                evaluation.detail,
                Value::Null,
                Some(evaluation.prereq_of.to_owned()),
            ));
        }
    }
}

