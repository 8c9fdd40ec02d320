// SPDX-License-Identifier: MIT OR Apache-2.0
//! The full ruleset snapshot exchanged with the control plane.

use super::descriptor::{FlagDescriptor, SegmentDescriptor};
use super::flag::Flag;
use super::segment::Segment;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;

/// A complete set of flags and segments, as carried by a streaming `put`
/// or a polling response body.
///
/// The wire form holds raw flag/segment objects; deserialization wraps each
/// in a present [`ItemDescriptor`](super::ItemDescriptor) carrying the
/// item's own version.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DataSet {
    /// Flags by key.
    pub flags: HashMap<String, FlagDescriptor>,
    /// Segments by key.
    pub segments: HashMap<String, SegmentDescriptor>,
}

#[derive(Deserialize)]
struct WireDataSet {
    #[serde(default)]
    flags: HashMap<String, Flag>,
    #[serde(default)]
    segments: HashMap<String, Segment>,
}

impl<'de> Deserialize<'de> for DataSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let wire = WireDataSet::deserialize(deserializer)?;
        Ok(DataSet {
            flags: wire
                .flags
                .into_iter()
                .map(|(k, flag)| (k, FlagDescriptor::new(flag)))
                .collect(),
            segments: wire
                .segments
                .into_iter()
                .map(|(k, segment)| (k, SegmentDescriptor::new(segment)))
                .collect(),
        })
    }
}
