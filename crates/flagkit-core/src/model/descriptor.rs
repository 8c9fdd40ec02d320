// SPDX-License-Identifier: MIT OR Apache-2.0
//! Versioned descriptors: a flag or segment that is either present or a
//! tombstone left by a delete.

use super::flag::Flag;
use super::segment::Segment;
use serde::{Deserialize, Serialize};

/// The two kinds of data the SDK synchronizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DataKind {
    /// Feature flags.
    Flag,
    /// Segments.
    Segment,
}

impl DataKind {
    /// Both kinds, in a fixed order.
    pub const ALL: [DataKind; 2] = [DataKind::Flag, DataKind::Segment];

    /// Human-readable name for logs.
    pub fn name(self) -> &'static str {
        match self {
            DataKind::Flag => "flag",
            DataKind::Segment => "segment",
        }
    }
}

/// Items that carry a configuration version.
pub trait Versioned {
    /// The item's version.
    fn version(&self) -> u64;
}

impl Versioned for Flag {
    fn version(&self) -> u64 {
        self.version
    }
}

impl Versioned for Segment {
    fn version(&self) -> u64 {
        self.version
    }
}

/// A versioned wrapper over a flag or segment.
///
/// `item == None` is a tombstone: the item existed and was deleted at
/// `version`. Tombstones participate in version monotonicity exactly like
/// present items.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor<T> {
    /// Version of the item or of the delete that produced the tombstone.
    pub version: u64,
    /// The item, or `None` for a tombstone.
    pub item: Option<T>,
}

impl<T: Versioned> ItemDescriptor<T> {
    /// Wrap a present item, taking the version from the item itself.
    pub fn new(item: T) -> Self {
        Self {
            version: item.version(),
            item: Some(item),
        }
    }
}

impl<T> ItemDescriptor<T> {
    /// A tombstone at the given version.
    pub fn tombstone(version: u64) -> Self {
        Self {
            version,
            item: None,
        }
    }

    /// True when the item is present (not a tombstone).
    pub fn is_present(&self) -> bool {
        self.item.is_some()
    }
}

/// A versioned flag or its tombstone.
pub type FlagDescriptor = ItemDescriptor<Flag>;

/// A versioned segment or its tombstone.
pub type SegmentDescriptor = ItemDescriptor<Segment>;
