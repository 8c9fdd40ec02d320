// SPDX-License-Identifier: MIT OR Apache-2.0
//! Traits at the seams of the data system.

use flagkit_core::{DataSet, FlagDescriptor, SegmentDescriptor};
use std::collections::HashMap;
use std::sync::Arc;

/// Read access to a ruleset.
///
/// Descriptors are handed out as shared handles so an evaluation can hold
/// its snapshot while the store is concurrently updated.
pub trait Store: Send + Sync {
    /// The flag descriptor for `key`, if the store has ever seen it
    /// (tombstones included).
    fn get_flag(&self, key: &str) -> Option<Arc<FlagDescriptor>>;

    /// The segment descriptor for `key`, if present.
    fn get_segment(&self, key: &str) -> Option<Arc<SegmentDescriptor>>;

    /// A consistent snapshot of all flags.
    fn all_flags(&self) -> HashMap<String, Arc<FlagDescriptor>>;

    /// A consistent snapshot of all segments.
    fn all_segments(&self) -> HashMap<String, Arc<SegmentDescriptor>>;

    /// True once an initial ruleset has been ingested.
    fn initialized(&self) -> bool;
}

impl<T: Store + ?Sized> Store for Arc<T> {
    fn get_flag(&self, key: &str) -> Option<Arc<FlagDescriptor>> {
        (**self).get_flag(key)
    }

    fn get_segment(&self, key: &str) -> Option<Arc<SegmentDescriptor>> {
        (**self).get_segment(key)
    }

    fn all_flags(&self) -> HashMap<String, Arc<FlagDescriptor>> {
        (**self).all_flags()
    }

    fn all_segments(&self) -> HashMap<String, Arc<SegmentDescriptor>> {
        (**self).all_segments()
    }

    fn initialized(&self) -> bool {
        (**self).initialized()
    }
}

/// Write access to a ruleset: the sink side of a data source.
pub trait Destination: Send + Sync {
    /// Atomically replace the entire ruleset.
    fn init(&self, data: DataSet);

    /// Insert or replace one flag (or tombstone). Versions must increase;
    /// stale upserts are discarded.
    fn upsert_flag(&self, key: &str, flag: FlagDescriptor);

    /// Insert or replace one segment (or tombstone), with the same
    /// monotonicity rule.
    fn upsert_segment(&self, key: &str, segment: SegmentDescriptor);
}

impl<T: Destination + ?Sized> Destination for Arc<T> {
    fn init(&self, data: DataSet) {
        (**self).init(data)
    }

    fn upsert_flag(&self, key: &str, flag: FlagDescriptor) {
        (**self).upsert_flag(key, flag)
    }

    fn upsert_segment(&self, key: &str, segment: SegmentDescriptor) {
        (**self).upsert_segment(key, segment)
    }
}
