// SPDX-License-Identifier: MIT OR Apache-2.0
//! The lazy-load data system: on-demand reads through a TTL cache.
//!
//! Items refresh individually as they are requested, which spreads load on
//! the external store across time. The bulk `all_*` reads are themselves
//! TTL-keyed (on well-known unscoped keys) so an `all_flags_state` call
//! costs one bulk fetch per TTL window instead of one fetch per flag.
//! Stale items are served rather than evicted: last-known data beats no
//! data when the store is unreachable.

use crate::status::{DataSourceState, DataSourceStatusManager, ErrorKind};
use crate::system::DataSystem;
use flagkit_core::{DataKind, Flag, FlagDescriptor, Segment, SegmentDescriptor};
use flagkit_store::{
    Destination, ExpirationTracker, MemoryStore, SerializedDataReader, SerializedItemDescriptor,
    Store, TrackState,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::warn;

const ALL_FLAGS_KEY: &str = "allFlags";
const ALL_SEGMENTS_KEY: &str = "allSegments";
const INITIALIZED_KEY: &str = "initialized";

struct Inner {
    cache: MemoryStore,
    tracker: ExpirationTracker,
    initialized: Option<bool>,
}

/// A TTL-refreshed cache in front of a [`SerializedDataReader`].
pub struct LazyLoad {
    reader: Arc<dyn SerializedDataReader>,
    status: Arc<DataSourceStatusManager>,
    refresh_ttl: Duration,
    inner: Mutex<Inner>,
}

impl LazyLoad {
    /// Wrap an external reader with the given refresh TTL.
    pub fn new(
        reader: Arc<dyn SerializedDataReader>,
        refresh_ttl: Duration,
        status: Arc<DataSourceStatusManager>,
    ) -> Self {
        Self {
            reader,
            status,
            refresh_ttl,
            inner: Mutex::new(Inner {
                cache: MemoryStore::new(),
                tracker: ExpirationTracker::new(),
                initialized: None,
            }),
        }
    }

    fn expiry(&self, now: Instant) -> Instant {
        now + self.refresh_ttl
    }

    fn refresh_flag(&self, inner: &mut Inner, key: &str, now: Instant) {
        match self.reader.get(DataKind::Flag, key) {
            Ok(item) => {
                match item.as_ref().map(decode_flag) {
                    Some(Ok(descriptor)) => inner.cache.upsert_flag(key, descriptor),
                    Some(Err(err)) => {
                        warn!(key, "discarding undecodable flag from store: {err}");
                        inner.cache.remove_flag(key);
                    }
                    None => inner.cache.remove_flag(key),
                }
                inner
                    .tracker
                    .add_scoped(DataKind::Flag, key, self.expiry(now));
            }
            // The tracker is deliberately not updated on a read error, so
            // the next call re-attempts immediately.
            Err(err) => self.store_error(&err),
        }
    }

    fn refresh_segment(&self, inner: &mut Inner, key: &str, now: Instant) {
        match self.reader.get(DataKind::Segment, key) {
            Ok(item) => {
                match item.as_ref().map(decode_segment) {
                    Some(Ok(descriptor)) => inner.cache.upsert_segment(key, descriptor),
                    Some(Err(err)) => {
                        warn!(key, "discarding undecodable segment from store: {err}");
                        inner.cache.remove_segment(key);
                    }
                    None => inner.cache.remove_segment(key),
                }
                inner
                    .tracker
                    .add_scoped(DataKind::Segment, key, self.expiry(now));
            }
            Err(err) => self.store_error(&err),
        }
    }

    fn refresh_all(&self, inner: &mut Inner, kind: DataKind, now: Instant) {
        match self.reader.all(kind) {
            Ok(items) => {
                for (key, item) in &items {
                    match kind {
                        DataKind::Flag => match decode_flag(item) {
                            Ok(descriptor) => inner.cache.upsert_flag(key, descriptor),
                            Err(err) => {
                                warn!(key = key.as_str(), "discarding undecodable flag from store: {err}")
                            }
                        },
                        DataKind::Segment => match decode_segment(item) {
                            Ok(descriptor) => inner.cache.upsert_segment(key, descriptor),
                            Err(err) => {
                                warn!(key = key.as_str(), "discarding undecodable segment from store: {err}")
                            }
                        },
                    }
                    inner.tracker.add_scoped(kind, key, self.expiry(now));
                }
                let unscoped_key = match kind {
                    DataKind::Flag => ALL_FLAGS_KEY,
                    DataKind::Segment => ALL_SEGMENTS_KEY,
                };
                inner.tracker.add(unscoped_key, self.expiry(now));
                // Bulk refreshes are a convenient moment to shed dead
                // tracker entries; cached values stay (stale beats empty).
                inner.tracker.prune(now);
            }
            Err(err) => self.store_error(&err),
        }
    }

    fn store_error(&self, err: &dyn std::fmt::Display) {
        warn!("persistent store read failed: {err}");
        self.status
            .set_error(ErrorKind::StoreError, &err.to_string());
    }
}

impl Store for LazyLoad {
    fn get_flag(&self, key: &str) -> Option<Arc<FlagDescriptor>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lazy-load cache poisoned");
        if inner.tracker.state_scoped(DataKind::Flag, key, now) != TrackState::Fresh {
            self.refresh_flag(&mut inner, key, now);
        }
        inner.cache.get_flag(key)
    }

    fn get_segment(&self, key: &str) -> Option<Arc<SegmentDescriptor>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lazy-load cache poisoned");
        if inner.tracker.state_scoped(DataKind::Segment, key, now) != TrackState::Fresh {
            self.refresh_segment(&mut inner, key, now);
        }
        inner.cache.get_segment(key)
    }

    fn all_flags(&self) -> HashMap<String, Arc<FlagDescriptor>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lazy-load cache poisoned");
        if inner.tracker.state(ALL_FLAGS_KEY, now) != TrackState::Fresh {
            self.refresh_all(&mut inner, DataKind::Flag, now);
        }
        inner.cache.all_flags()
    }

    fn all_segments(&self) -> HashMap<String, Arc<SegmentDescriptor>> {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lazy-load cache poisoned");
        if inner.tracker.state(ALL_SEGMENTS_KEY, now) != TrackState::Fresh {
            self.refresh_all(&mut inner, DataKind::Segment, now);
        }
        inner.cache.all_segments()
    }

    fn initialized(&self) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock().expect("lazy-load cache poisoned");
        // Once true, always true for the lifetime of this system.
        if inner.initialized == Some(true) {
            return true;
        }
        if inner.initialized == Some(false)
            && inner.tracker.state(INITIALIZED_KEY, now) == TrackState::Fresh
        {
            return false;
        }
        let initialized = self.reader.initialized();
        inner.initialized = Some(initialized);
        inner.tracker.add(INITIALIZED_KEY, self.expiry(now));
        initialized
    }
}

impl DataSystem for LazyLoad {
    fn initialize(&self, _handle: &Handle) {
        self.status.set_state(DataSourceState::Initializing);
        if self.initialized() {
            self.status.set_state(DataSourceState::Valid);
        }
    }

    fn shutdown(&self) {}

    fn identity(&self) -> String {
        format!("lazy load via {}", self.reader.identity())
    }
}

fn decode_flag(item: &SerializedItemDescriptor) -> Result<FlagDescriptor, serde_json::Error> {
    if item.deleted {
        return Ok(FlagDescriptor::tombstone(item.version));
    }
    match &item.serialized_item {
        Some(json) => {
            let flag: Flag = serde_json::from_str(json)?;
            Ok(FlagDescriptor::new(flag))
        }
        None => Ok(FlagDescriptor::tombstone(item.version)),
    }
}

fn decode_segment(item: &SerializedItemDescriptor) -> Result<SegmentDescriptor, serde_json::Error> {
    if item.deleted {
        return Ok(SegmentDescriptor::tombstone(item.version));
    }
    match &item.serialized_item {
        Some(json) => {
            let segment: Segment = serde_json::from_str(json)?;
            Ok(SegmentDescriptor::new(segment))
        }
        None => Ok(SegmentDescriptor::tombstone(item.version)),
    }
}
