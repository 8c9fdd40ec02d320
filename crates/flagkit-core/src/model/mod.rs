// SPDX-License-Identifier: MIT OR Apache-2.0
//! The flag and segment data model as delivered by the control plane.

mod clause;
mod data_set;
mod descriptor;
mod flag;
mod segment;

pub use clause::{Clause, Operator};
pub use data_set::DataSet;
pub use descriptor::{DataKind, FlagDescriptor, ItemDescriptor, SegmentDescriptor, Versioned};
pub use flag::{
    ClientSideAvailability, Flag, FlagRule, Prerequisite, Rollout, RolloutKind, Target,
    VariationOrRollout, WeightedVariation,
};
pub use segment::{Segment, SegmentRule, SegmentTarget};
