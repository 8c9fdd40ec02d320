// SPDX-License-Identifier: MIT OR Apache-2.0
//! Dependency tracking between flags and segments.
//!
//! Flags depend on other flags (prerequisites) and on segments
//! (`segmentMatch` clauses); segments can depend on further segments. The
//! tracker maintains forward and reverse edges so an upsert of one item can
//! be translated into the set of flags whose evaluation may have changed.

use flagkit_core::{Clause, DataKind, FlagDescriptor, Operator, SegmentDescriptor};
use std::collections::{BTreeSet, HashMap};

/// A set of item keys, partitioned by [`DataKind`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DependencySet {
    flags: BTreeSet<String>,
    segments: BTreeSet<String>,
}

impl DependencySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key under the given kind.
    pub fn insert(&mut self, kind: DataKind, key: impl Into<String>) {
        self.scope_mut(kind).insert(key.into());
    }

    /// Remove a key from the given kind.
    pub fn remove(&mut self, kind: DataKind, key: &str) {
        self.scope_mut(kind).remove(key);
    }

    /// Membership test.
    pub fn contains(&self, kind: DataKind, key: &str) -> bool {
        self.scope(kind).contains(key)
    }

    /// Total number of keys across both kinds.
    pub fn len(&self) -> usize {
        self.flags.len() + self.segments.len()
    }

    /// True when no keys are present.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty() && self.segments.is_empty()
    }

    /// The keys of one kind, in sorted order.
    pub fn scope(&self, kind: DataKind) -> &BTreeSet<String> {
        match kind {
            DataKind::Flag => &self.flags,
            DataKind::Segment => &self.segments,
        }
    }

    fn scope_mut(&mut self, kind: DataKind) -> &mut BTreeSet<String> {
        match kind {
            DataKind::Flag => &mut self.flags,
            DataKind::Segment => &mut self.segments,
        }
    }

    /// Iterate `(kind, key)` pairs across both scopes.
    pub fn iter(&self) -> impl Iterator<Item = (DataKind, &str)> {
        DataKind::ALL.into_iter().flat_map(move |kind| {
            self.scope(kind).iter().map(move |k| (kind, k.as_str()))
        })
    }
}

/// `(kind, key) -> DependencySet`.
#[derive(Clone, Debug, Default)]
pub struct DependencyMap {
    flags: HashMap<String, DependencySet>,
    segments: HashMap<String, DependencySet>,
}

impl DependencyMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entry for `(kind, key)`.
    pub fn set(&mut self, kind: DataKind, key: impl Into<String>, deps: DependencySet) {
        self.scope_mut(kind).insert(key.into(), deps);
    }

    /// The entry for `(kind, key)`, if any.
    pub fn get(&self, kind: DataKind, key: &str) -> Option<&DependencySet> {
        self.scope(kind).get(key)
    }

    fn get_mut(&mut self, kind: DataKind, key: &str) -> Option<&mut DependencySet> {
        self.scope_mut(kind).get_mut(key)
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.flags.clear();
        self.segments.clear();
    }

    fn scope(&self, kind: DataKind) -> &HashMap<String, DependencySet> {
        match kind {
            DataKind::Flag => &self.flags,
            DataKind::Segment => &self.segments,
        }
    }

    fn scope_mut(&mut self, kind: DataKind) -> &mut HashMap<String, DependencySet> {
        match kind {
            DataKind::Flag => &mut self.flags,
            DataKind::Segment => &mut self.segments,
        }
    }
}

/// Maintains the dependency graph and computes transitive change sets.
#[derive(Debug, Default)]
pub struct DependencyTracker {
    dependencies_from: DependencyMap,
    dependencies_to: DependencyMap,
}

impl DependencyTracker {
    /// An empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the dependencies of a flag (prerequisites plus the segments
    /// referenced by its rule clauses).
    pub fn update_flag_dependencies(&mut self, key: &str, flag: &FlagDescriptor) {
        let mut deps = DependencySet::new();
        if let Some(flag) = &flag.item {
            for prereq in &flag.prerequisites {
                deps.insert(DataKind::Flag, prereq.key.clone());
            }
            for rule in &flag.rules {
                clause_dependencies(&mut deps, &rule.clauses);
            }
        }
        self.update(DataKind::Flag, key, deps);
    }

    /// Record the dependencies of a segment (segments referenced by its
    /// rule clauses).
    pub fn update_segment_dependencies(&mut self, key: &str, segment: &SegmentDescriptor) {
        let mut deps = DependencySet::new();
        if let Some(segment) = &segment.item {
            for rule in &segment.rules {
                clause_dependencies(&mut deps, &rule.clauses);
            }
        }
        self.update(DataKind::Segment, key, deps);
    }

    /// Accumulate into `out` every item that transitively depends on
    /// `(kind, key)`, including the item itself.
    pub fn calculate_changes(&self, kind: DataKind, key: &str, out: &mut DependencySet) {
        if out.contains(kind, key) {
            return;
        }
        out.insert(kind, key);
        if let Some(affected) = self.dependencies_to.get(kind, key) {
            let affected = affected.clone();
            for (dep_kind, dep_key) in affected.iter() {
                self.calculate_changes(dep_kind, dep_key, out);
            }
        }
    }

    /// Forget everything (used when a full `init` replaces the ruleset).
    pub fn clear(&mut self) {
        self.dependencies_from.clear();
        self.dependencies_to.clear();
    }

    fn update(&mut self, kind: DataKind, key: &str, deps: DependencySet) {
        // Remove the reverse edges of the previous dependency set.
        if let Some(previous) = self.dependencies_from.get(kind, key) {
            let previous = previous.clone();
            for (dep_kind, dep_key) in previous.iter() {
                if let Some(reverse) = self.dependencies_to.get_mut(dep_kind, dep_key) {
                    reverse.remove(kind, key);
                }
            }
        }

        // Install the new forward entry and its reverse edges.
        for (dep_kind, dep_key) in deps.iter() {
            match self.dependencies_to.get_mut(dep_kind, dep_key) {
                Some(reverse) => reverse.insert(kind, key),
                None => {
                    let mut reverse = DependencySet::new();
                    reverse.insert(kind, key);
                    self.dependencies_to.set(dep_kind, dep_key, reverse);
                }
            }
        }
        self.dependencies_from.set(kind, key, deps);
    }
}

fn clause_dependencies(deps: &mut DependencySet, clauses: &[Clause]) {
    for clause in clauses {
        if clause.op == Operator::SegmentMatch {
            for value in &clause.values {
                if let Some(segment_key) = value.as_str() {
                    deps.insert(DataKind::Segment, segment_key);
                }
            }
        }
    }
}
