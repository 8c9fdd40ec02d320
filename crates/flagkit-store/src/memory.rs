// SPDX-License-Identifier: MIT OR Apache-2.0
//! The in-memory ruleset store.

use crate::interfaces::{Destination, Store};
use flagkit_core::{DataSet, FlagDescriptor, SegmentDescriptor};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Inner {
    flags: HashMap<String, Arc<FlagDescriptor>>,
    segments: HashMap<String, Arc<SegmentDescriptor>>,
    initialized: bool,
}

/// Thread-safe map of flag and segment descriptors by key.
///
/// `init` atomically replaces both maps; `upsert_*` enforces version
/// monotonicity, silently discarding writes whose version does not exceed
/// the existing entry's (tombstones participate in the same check).
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty, uninitialized store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert_versioned<T>(map: &mut HashMap<String, Arc<T>>, key: &str, incoming: T, version: u64)
where
    T: VersionedDescriptor,
{
    match map.get(key) {
        Some(existing) if version <= existing.version() => {}
        _ => {
            map.insert(key.to_owned(), Arc::new(incoming));
        }
    }
}

trait VersionedDescriptor {
    fn version(&self) -> u64;
}

impl VersionedDescriptor for FlagDescriptor {
    fn version(&self) -> u64 {
        self.version
    }
}

impl VersionedDescriptor for SegmentDescriptor {
    fn version(&self) -> u64 {
        self.version
    }
}

impl Store for MemoryStore {
    fn get_flag(&self, key: &str) -> Option<Arc<FlagDescriptor>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner.flags.get(key).cloned()
    }

    fn get_segment(&self, key: &str) -> Option<Arc<SegmentDescriptor>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner.segments.get(key).cloned()
    }

    fn all_flags(&self) -> HashMap<String, Arc<FlagDescriptor>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner.flags.clone()
    }

    fn all_segments(&self) -> HashMap<String, Arc<SegmentDescriptor>> {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner.segments.clone()
    }

    fn initialized(&self) -> bool {
        let inner = self.inner.lock().expect("memory store lock poisoned");
        inner.initialized
    }
}

impl Destination for MemoryStore {
    fn init(&self, data: DataSet) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.initialized = true;
        inner.flags = data
            .flags
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
        inner.segments = data
            .segments
            .into_iter()
            .map(|(k, v)| (k, Arc::new(v)))
            .collect();
    }

    fn upsert_flag(&self, key: &str, flag: FlagDescriptor) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let version = flag.version;
        upsert_versioned(&mut inner.flags, key, flag, version);
    }

    fn upsert_segment(&self, key: &str, segment: SegmentDescriptor) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        let version = segment.version;
        upsert_versioned(&mut inner.segments, key, segment, version);
    }
}

/// Remove operations used by the lazy-load cache (a plain data source never
/// removes, it writes tombstones).
impl MemoryStore {
    /// Drop a flag entry entirely.
    pub fn remove_flag(&self, key: &str) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.flags.remove(key);
    }

    /// Drop a segment entry entirely.
    pub fn remove_segment(&self, key: &str) {
        let mut inner = self.inner.lock().expect("memory store lock poisoned");
        inner.segments.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagkit_core::Flag;

    fn flag(key: &str, version: u64) -> FlagDescriptor {
        FlagDescriptor::new(Flag {
            key: key.into(),
            version,
            ..Flag::default()
        })
    }

    #[test]
    fn initialized_only_after_init() {
        let store = MemoryStore::new();
        assert!(!store.initialized());
        store.init(DataSet::default());
        assert!(store.initialized());
    }

    #[test]
    fn upsert_discards_stale_versions() {
        let store = MemoryStore::new();
        store.upsert_flag("f", flag("f", 5));
        store.upsert_flag("f", flag("f", 5));
        assert_eq!(store.get_flag("f").unwrap().version, 5);
        store.upsert_flag("f", flag("f", 4));
        assert_eq!(store.get_flag("f").unwrap().version, 5);
        store.upsert_flag("f", flag("f", 6));
        assert_eq!(store.get_flag("f").unwrap().version, 6);
    }

    #[test]
    fn tombstones_participate_in_monotonicity() {
        let store = MemoryStore::new();
        store.upsert_flag("f", flag("f", 10));
        store.upsert_flag("f", FlagDescriptor::tombstone(11));
        let desc = store.get_flag("f").unwrap();
        assert!(!desc.is_present());
        assert_eq!(desc.version, 11);
        // A same-version resurrect is a no-op.
        store.upsert_flag("f", flag("f", 11));
        assert!(!store.get_flag("f").unwrap().is_present());
    }

    #[test]
    fn init_replaces_everything() {
        let store = MemoryStore::new();
        store.upsert_flag("old", flag("old", 1));
        let mut data = DataSet::default();
        data.flags.insert("new".into(), flag("new", 1));
        store.init(data);
        assert!(store.get_flag("old").is_none());
        assert!(store.get_flag("new").is_some());
    }
}
