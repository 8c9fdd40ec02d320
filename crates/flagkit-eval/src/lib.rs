// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod bucketing;
pub mod error;
pub mod evaluator;
pub mod operators;
mod rules;
mod stack;

pub use bucketing::{BucketPrefix, BucketResult, KindPresence};
pub use error::EvalError;
pub use evaluator::{Evaluator, NoopPrerequisiteSink, PrerequisiteEventSink, PrerequisiteEvaluation};
