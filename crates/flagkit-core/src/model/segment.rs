// SPDX-License-Identifier: MIT OR Apache-2.0
//! Segment descriptors: reusable predicates over contexts.

use super::clause::Clause;
use crate::attributes::AttributeRef;
use serde::{Deserialize, Serialize};

fn default_context_kind() -> String {
    "user".to_owned()
}

/// A segment as delivered by the control plane.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Segment {
    /// Unique segment key.
    pub key: String,
    /// Monotonically increasing configuration version.
    pub version: u64,
    /// Salt mixed into weighted segment-rule bucketing.
    pub salt: String,
    /// Big-segment marker; membership for unbounded segments is resolved by
    /// an external store, which this SDK does not consult.
    pub unbounded: bool,
    /// Legacy user keys that are always in the segment.
    pub included: Vec<String>,
    /// Legacy user keys that are never in the segment.
    pub excluded: Vec<String>,
    /// Context-kind-aware inclusion lists.
    pub included_contexts: Vec<SegmentTarget>,
    /// Context-kind-aware exclusion lists.
    pub excluded_contexts: Vec<SegmentTarget>,
    /// Ordered membership rules.
    pub rules: Vec<SegmentRule>,
}

/// A per-kind key list inside a segment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentTarget {
    /// Context kind the keys belong to.
    #[serde(default = "default_context_kind")]
    pub context_kind: String,
    /// The listed context keys.
    #[serde(default)]
    pub values: Vec<String>,
}

/// A membership rule: a conjunction of clauses, optionally weighted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentRule {
    /// Conjunction of predicates; all must match.
    #[serde(default)]
    pub clauses: Vec<Clause>,
    /// Attribute the weighting bucket is derived from; defaults to `key`.
    #[serde(default)]
    pub bucket_by: Option<AttributeRef>,
    /// Context kind the weighting attribute is read from.
    #[serde(default = "default_context_kind")]
    pub rollout_context_kind: String,
    /// Percentage weight out of 100000; `None` means the rule matches
    /// unconditionally once its clauses do.
    #[serde(default)]
    pub weight: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_segment_with_legacy_and_context_targets() {
        let segment: Segment = serde_json::from_str(
            r#"{"key":"beta","version":7,"salt":"s",
                "included":["alice"],
                "includedContexts":[{"contextKind":"org","values":["acme"]}],
                "rules":[{"clauses":[],"weight":25000}]}"#,
        )
        .unwrap();
        assert_eq!(segment.included, vec!["alice"]);
        assert_eq!(segment.included_contexts[0].context_kind, "org");
        assert_eq!(segment.rules[0].weight, Some(25000));
        assert_eq!(segment.rules[0].rollout_context_kind, "user");
        assert!(!segment.unbounded);
    }
}
