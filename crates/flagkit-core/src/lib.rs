// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod attributes;
pub mod context;
pub mod detail;
pub mod model;
pub mod value;

pub use attributes::AttributeRef;
pub use context::{Context, ContextBuilder};
pub use detail::{ErrorKind, EvaluationDetail, EvaluationReason};
pub use model::{
    Clause, ClientSideAvailability, DataKind, DataSet, Flag, FlagDescriptor, FlagRule,
    ItemDescriptor, Operator, Prerequisite, Rollout, RolloutKind, Segment, SegmentDescriptor,
    SegmentRule, SegmentTarget, Target, VariationOrRollout, Versioned, WeightedVariation,
};
pub use value::Value;
