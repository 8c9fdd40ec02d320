// SPDX-License-Identifier: MIT OR Apache-2.0
//! Change notification: translating ruleset writes into flag-change events.

use crate::dependency::{DependencySet, DependencyTracker};
use crate::interfaces::{Destination, Store};
use flagkit_core::{DataKind, DataSet, FlagDescriptor, SegmentDescriptor};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// The flag keys whose evaluation may have changed after one write.
pub type FlagChangeSet = Arc<BTreeSet<String>>;

type Listener = Arc<dyn Fn(&FlagChangeSet) + Send + Sync>;

struct Listeners {
    entries: Vec<(u64, Listener)>,
    next_id: u64,
}

/// Handle returned from [`ChangeNotifier::on_flag_change`]; dropping it
/// unregisters the listener.
pub struct ListenerHandle {
    id: u64,
    listeners: Weak<Mutex<Listeners>>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            let mut guard = listeners.lock().expect("listener registry poisoned");
            guard.entries.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Wraps a [`Destination`] and its backing [`Store`], publishing the
/// transitive set of affected flag keys after each write.
///
/// Dependency bookkeeping and change computation happen before the write so
/// `init` can diff old versus new versions; listeners are invoked after the
/// destination has been updated, outside any lock held by this type.
pub struct ChangeNotifier<D, S> {
    sink: D,
    source: S,
    tracker: Mutex<DependencyTracker>,
    listeners: Arc<Mutex<Listeners>>,
}

impl<D: Destination, S: Store> ChangeNotifier<D, S> {
    /// Wrap a destination and the store it writes into.
    pub fn new(sink: D, source: S) -> Self {
        Self {
            sink,
            source,
            tracker: Mutex::new(DependencyTracker::new()),
            listeners: Arc::new(Mutex::new(Listeners {
                entries: Vec::new(),
                next_id: 0,
            })),
        }
    }

    /// Register a flag-change listener. The listener runs on the data
    /// system's I/O task; keep it fast.
    pub fn on_flag_change(
        &self,
        listener: impl Fn(&FlagChangeSet) + Send + Sync + 'static,
    ) -> ListenerHandle {
        let mut guard = self.listeners.lock().expect("listener registry poisoned");
        let id = guard.next_id;
        guard.next_id += 1;
        guard.entries.push((id, Arc::new(listener)));
        ListenerHandle {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    fn has_listeners(&self) -> bool {
        let guard = self.listeners.lock().expect("listener registry poisoned");
        !guard.entries.is_empty()
    }

    fn notify(&self, changes: DependencySet) {
        let flag_changes: BTreeSet<String> =
            changes.scope(DataKind::Flag).iter().cloned().collect();
        if flag_changes.is_empty() {
            return;
        }
        debug!(flags = flag_changes.len(), "notifying flag-change listeners");
        let change_set: FlagChangeSet = Arc::new(flag_changes);
        // Snapshot the callbacks so they run outside the registry lock.
        let snapshot: Vec<Listener> = {
            let guard = self.listeners.lock().expect("listener registry poisoned");
            guard.entries.iter().map(|(_, l)| Arc::clone(l)).collect()
        };
        for listener in snapshot {
            listener(&change_set);
        }
    }
}

impl<D: Destination, S: Store> Destination for ChangeNotifier<D, S> {
    fn init(&self, data: DataSet) {
        let changes = self.has_listeners().then(|| {
            let tracker = self.tracker.lock().expect("dependency tracker poisoned");
            let mut changed = DependencySet::new();
            let old_flags = self.source.all_flags();
            for (key, new) in &data.flags {
                match old_flags.get(key) {
                    Some(old) if old.version == new.version => {}
                    _ => tracker.calculate_changes(DataKind::Flag, key, &mut changed),
                }
            }
            for key in old_flags.keys() {
                if !data.flags.contains_key(key) {
                    tracker.calculate_changes(DataKind::Flag, key, &mut changed);
                }
            }
            let old_segments = self.source.all_segments();
            for (key, new) in &data.segments {
                match old_segments.get(key) {
                    Some(old) if old.version == new.version => {}
                    _ => tracker.calculate_changes(DataKind::Segment, key, &mut changed),
                }
            }
            for key in old_segments.keys() {
                if !data.segments.contains_key(key) {
                    tracker.calculate_changes(DataKind::Segment, key, &mut changed);
                }
            }
            changed
        });

        {
            let mut tracker = self.tracker.lock().expect("dependency tracker poisoned");
            tracker.clear();
            for (key, flag) in &data.flags {
                tracker.update_flag_dependencies(key, flag);
            }
            for (key, segment) in &data.segments {
                tracker.update_segment_dependencies(key, segment);
            }
        }

        self.sink.init(data);

        if let Some(changes) = changes {
            self.notify(changes);
        }
    }

    fn upsert_flag(&self, key: &str, flag: FlagDescriptor) {
        // A stale upsert is discarded by the store; neither the dependency
        // graph nor the listeners should see it.
        if self.is_stale(DataKind::Flag, key, flag.version) {
            self.sink.upsert_flag(key, flag);
            return;
        }
        let changes = self.compute_changes(DataKind::Flag, key);
        {
            let mut tracker = self.tracker.lock().expect("dependency tracker poisoned");
            tracker.update_flag_dependencies(key, &flag);
        }
        self.sink.upsert_flag(key, flag);
        if let Some(changes) = changes {
            self.notify(changes);
        }
    }

    fn upsert_segment(&self, key: &str, segment: SegmentDescriptor) {
        if self.is_stale(DataKind::Segment, key, segment.version) {
            self.sink.upsert_segment(key, segment);
            return;
        }
        let changes = self.compute_changes(DataKind::Segment, key);
        {
            let mut tracker = self.tracker.lock().expect("dependency tracker poisoned");
            tracker.update_segment_dependencies(key, &segment);
        }
        self.sink.upsert_segment(key, segment);
        if let Some(changes) = changes {
            self.notify(changes);
        }
    }
}

impl<D: Destination, S: Store> ChangeNotifier<D, S> {
    fn is_stale(&self, kind: DataKind, key: &str, version: u64) -> bool {
        let existing_version = match kind {
            DataKind::Flag => self.source.get_flag(key).map(|d| d.version),
            DataKind::Segment => self.source.get_segment(key).map(|d| d.version),
        };
        existing_version.is_some_and(|v| version <= v)
    }

    fn compute_changes(&self, kind: DataKind, key: &str) -> Option<DependencySet> {
        if !self.has_listeners() {
            return None;
        }
        let tracker = self.tracker.lock().expect("dependency tracker poisoned");
        let mut changed = DependencySet::new();
        tracker.calculate_changes(kind, key, &mut changed);
        Some(changed)
    }
}
