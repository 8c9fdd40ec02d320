// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatcher;
pub mod events;
pub mod outbox;
pub mod pool;
pub mod redaction;
pub mod summarizer;
pub mod worker;

pub use dispatcher::{EventDispatcher, EventProcessor};
pub use events::{CustomEvent, EvalEvent, IdentifyEvent, InputEvent, now_millis};
pub use pool::WorkerPool;
pub use worker::{DeliveryWorker, EventBatch, PermanentFailureCallback, ServerTimeCallback};
