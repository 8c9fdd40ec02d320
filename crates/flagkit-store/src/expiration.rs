// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-key TTL tracking for the lazy-load cache.

use flagkit_core::DataKind;
use std::collections::HashMap;
use std::time::Instant;

/// Freshness of a tracked key at a point in time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    /// The key's deadline is in the future.
    Fresh,
    /// The key's deadline has passed.
    Stale,
    /// The key has never been tracked.
    NotTracked,
}

/// Maps keys to monotonic-clock deadlines.
///
/// Keys live in one of three namespaces: flags, segments, or an unscoped
/// namespace for well-known keys such as `allFlags`. The tracker performs no
/// locking; callers synchronize it together with the cache it protects.
#[derive(Debug, Default)]
pub struct ExpirationTracker {
    flags: HashMap<String, Instant>,
    segments: HashMap<String, Instant>,
    unscoped: HashMap<String, Instant>,
}

impl ExpirationTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track an unscoped key until `expiration`.
    pub fn add(&mut self, key: impl Into<String>, expiration: Instant) {
        self.unscoped.insert(key.into(), expiration);
    }

    /// Track a kind-scoped key until `expiration`.
    pub fn add_scoped(&mut self, kind: DataKind, key: impl Into<String>, expiration: Instant) {
        self.scope_mut(kind).insert(key.into(), expiration);
    }

    /// Stop tracking an unscoped key.
    pub fn remove(&mut self, key: &str) {
        self.unscoped.remove(key);
    }

    /// Stop tracking a kind-scoped key.
    pub fn remove_scoped(&mut self, kind: DataKind, key: &str) {
        self.scope_mut(kind).remove(key);
    }

    /// Freshness of an unscoped key at `now`.
    pub fn state(&self, key: &str, now: Instant) -> TrackState {
        match self.unscoped.get(key) {
            Some(deadline) => state_at(*deadline, now),
            None => TrackState::NotTracked,
        }
    }

    /// Freshness of a kind-scoped key at `now`.
    pub fn state_scoped(&self, kind: DataKind, key: &str, now: Instant) -> TrackState {
        match self.scope(kind).get(key) {
            Some(deadline) => state_at(*deadline, now),
            None => TrackState::NotTracked,
        }
    }

    /// Remove every stale entry, returning `(kind, key)` pairs with `None`
    /// for the unscoped namespace.
    pub fn prune(&mut self, now: Instant) -> Vec<(Option<DataKind>, String)> {
        let mut pruned = Vec::new();
        for (key, deadline) in &self.unscoped {
            if state_at(*deadline, now) == TrackState::Stale {
                pruned.push((None, key.clone()));
            }
        }
        for kind in DataKind::ALL {
            for (key, deadline) in self.scope(kind) {
                if state_at(*deadline, now) == TrackState::Stale {
                    pruned.push((Some(kind), key.clone()));
                }
            }
        }
        for (kind, key) in &pruned {
            match kind {
                Some(kind) => {
                    self.scope_mut(*kind).remove(key);
                }
                None => {
                    self.unscoped.remove(key);
                }
            }
        }
        pruned
    }

    /// Forget everything.
    pub fn clear(&mut self) {
        self.flags.clear();
        self.segments.clear();
        self.unscoped.clear();
    }

    fn scope(&self, kind: DataKind) -> &HashMap<String, Instant> {
        match kind {
            DataKind::Flag => &self.flags,
            DataKind::Segment => &self.segments,
        }
    }

    fn scope_mut(&mut self, kind: DataKind) -> &mut HashMap<String, Instant> {
        match kind {
            DataKind::Flag => &mut self.flags,
            DataKind::Segment => &mut self.segments,
        }
    }
}

fn state_at(deadline: Instant, now: Instant) -> TrackState {
    if deadline > now {
        TrackState::Fresh
    } else {
        TrackState::Stale
    }
}
