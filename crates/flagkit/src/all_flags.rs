// SPDX-License-Identifier: MIT OR Apache-2.0
//! The all-flags state: every flag's value and metadata for one context,
//! in the shape client-side SDKs bootstrap from.

use flagkit_core::{EvaluationReason, Value};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Options controlling [`AllFlagsState`] construction.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllFlagsStateOptions {
    /// Attach evaluation reasons to flag metadata.
    pub with_reasons: bool,
    /// Only include flags visible to client-side (environment-id) SDKs.
    pub client_side_only: bool,
    /// Omit reasons and versions for flags that are not tracked (reduces
    /// payload size).
    pub details_only_for_tracked_flags: bool,
}

/// Per-flag metadata carried alongside the evaluated value.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagState {
    /// Flag version at evaluation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Selected variation index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variation: Option<usize>,
    /// Why the value was selected.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<EvaluationReason>,
    /// Whether evaluations of this flag produce full events.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub track_events: bool,
    /// Whether the reason must accompany events for this flag.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub track_reason: bool,
    /// Debug-event cutoff, when in a debug window.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_events_until_date: Option<u64>,
}

/// Every flag's evaluated value plus metadata; `valid` is false when the
/// client had no ruleset to evaluate against.
#[derive(Clone, Debug, PartialEq)]
pub struct AllFlagsState {
    valid: bool,
    evaluations: BTreeMap<String, Value>,
    metadata: BTreeMap<String, FlagState>,
}

impl AllFlagsState {
    /// An invalid, empty state.
    pub fn invalid() -> Self {
        Self {
            valid: false,
            evaluations: BTreeMap::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub(crate) fn builder() -> AllFlagsStateBuilder {
        AllFlagsStateBuilder {
            state: Self {
                valid: true,
                evaluations: BTreeMap::new(),
                metadata: BTreeMap::new(),
            },
        }
    }

    /// Whether the state was computed from a real ruleset.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// The evaluated value for a flag, if present.
    pub fn value(&self, flag_key: &str) -> Option<&Value> {
        self.evaluations.get(flag_key)
    }

    /// The metadata for a flag, if present.
    pub fn state(&self, flag_key: &str) -> Option<&FlagState> {
        self.metadata.get(flag_key)
    }

    /// Number of flags captured.
    pub fn len(&self) -> usize {
        self.evaluations.len()
    }

    /// True when no flags were captured.
    pub fn is_empty(&self) -> bool {
        self.evaluations.is_empty()
    }
}

impl Serialize for AllFlagsState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.evaluations.len() + 2))?;
        for (key, value) in &self.evaluations {
            map.serialize_entry(key, value)?;
        }
        map.serialize_entry("$flagsState", &self.metadata)?;
        map.serialize_entry("$valid", &self.valid)?;
        map.end()
    }
}

pub(crate) struct AllFlagsStateBuilder {
    state: AllFlagsState,
}

impl AllFlagsStateBuilder {
    pub(crate) fn add_flag(&mut self, key: &str, value: Value, flag_state: FlagState) {
        self.state.evaluations.insert(key.to_owned(), value);
        self.state.metadata.insert(key.to_owned(), flag_state);
    }

    pub(crate) fn build(self) -> AllFlagsState {
        self.state
    }
}
