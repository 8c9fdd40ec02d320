// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod background_sync;
pub mod http;
pub mod lazy_load;
pub mod offline;
pub mod polling;
pub mod protocol;
pub mod sse;
pub mod status;
pub mod streaming;
pub mod system;

pub use background_sync::BackgroundSync;
pub use lazy_load::LazyLoad;
pub use offline::OfflineSystem;
pub use status::{
    DataSourceState, DataSourceStatus, DataSourceStatusManager, ErrorInfo, ErrorKind,
    StatusListenerHandle,
};
pub use system::DataSystem;
