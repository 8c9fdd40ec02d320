// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod all_flags;
mod client;
mod event_factory;

pub use all_flags::{AllFlagsState, AllFlagsStateOptions, FlagState};
pub use client::{Client, ClientError};
pub use event_factory::EventFactory;

pub use flagkit_config::{
    AppInfo, Config, ConfigError, DataSystemConfig, EventsConfig, HttpConfig, LazyLoadConfig,
    LoggingConfig, PollingConfig, ServiceEndpoints, StreamingConfig, SyncMethod,
};
pub use flagkit_core::{
    AttributeRef, Context, ContextBuilder, ErrorKind, EvaluationDetail, EvaluationReason, Value,
};
pub use flagkit_datasource::{DataSourceState, DataSourceStatus, StatusListenerHandle};
pub use flagkit_store::{FlagChangeSet, ListenerHandle, SerializedDataReader,
    SerializedItemDescriptor};
