// SPDX-License-Identifier: MIT OR Apache-2.0
//! Feature flag descriptors: targeting, rules, rollouts, prerequisites.

use super::clause::Clause;
use crate::attributes::AttributeRef;
use crate::value::Value;
use serde::{Deserialize, Serialize};

fn default_context_kind() -> String {
    "user".to_owned()
}

/// A feature flag as delivered by the control plane.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Flag {
    /// Unique flag key.
    pub key: String,
    /// Monotonically increasing configuration version.
    pub version: u64,
    /// Master switch; when false the off variation is served.
    pub on: bool,
    /// Salt mixed into rollout bucketing.
    pub salt: String,
    /// The candidate values, addressed by index everywhere else.
    pub variations: Vec<Value>,
    /// Variation served when the flag is off; `None` means serve null.
    pub off_variation: Option<usize>,
    /// What to serve when no target or rule matches.
    pub fallthrough: VariationOrRollout,
    /// Legacy per-user target lists (no context kind on the wire).
    pub targets: Vec<Target>,
    /// Context-kind-aware target lists; take priority over `targets`.
    pub context_targets: Vec<Target>,
    /// Ordered targeting rules.
    pub rules: Vec<FlagRule>,
    /// Flags that must evaluate to a specific variation first.
    pub prerequisites: Vec<Prerequisite>,
    /// Emit a full analytics event for every evaluation.
    pub track_events: bool,
    /// Emit a full analytics event for fallthrough evaluations.
    pub track_events_fallthrough: bool,
    /// Emit debug events until this time (milliseconds since epoch).
    pub debug_events_until_date: Option<u64>,
    /// Which client-side SDK credential types may see this flag.
    pub client_side_availability: ClientSideAvailability,
}

impl Flag {
    /// True when full event tracking applies to an evaluation with the
    /// given reason (experiment rollouts are always tracked).
    pub fn is_experimentation_enabled(&self, reason: &crate::detail::EvaluationReason) -> bool {
        use crate::detail::EvaluationReason;
        match reason {
            EvaluationReason::Fallthrough { .. } => {
                self.track_events_fallthrough || reason.in_experiment()
            }
            EvaluationReason::RuleMatch { rule_index, .. } => {
                reason.in_experiment()
                    || self.rules.get(*rule_index).is_some_and(|r| r.track_events)
            }
            _ => false,
        }
    }
}

/// Exposure of a flag to client-side SDK credential types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSideAvailability {
    /// Visible to environment-id (browser) SDKs.
    pub using_environment_id: bool,
    /// Visible to mobile-key SDKs.
    pub using_mobile_key: bool,
}

/// A fixed variation index or a probabilistic rollout.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariationOrRollout {
    /// A fixed variation index.
    #[serde(rename_all = "camelCase")]
    Variation {
        /// Index into [`Flag::variations`].
        variation: usize,
    },
    /// A weighted rollout across variations.
    #[serde(rename_all = "camelCase")]
    Rollout {
        /// The rollout description.
        rollout: Rollout,
    },
}

impl Default for VariationOrRollout {
    fn default() -> Self {
        VariationOrRollout::Variation { variation: 0 }
    }
}

/// Whether a rollout is a plain percentage split or a measured experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RolloutKind {
    /// Plain percentage rollout.
    #[default]
    Rollout,
    /// Experiment; assignments may be reported as `inExperiment`.
    Experiment,
}

/// Probabilistic assignment of a context to one of several variations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Rollout {
    /// Rollout or experiment.
    pub kind: RolloutKind,
    /// Seed for experiment bucketing; replaces the key/salt prefix.
    pub seed: Option<i64>,
    /// Attribute the bucket is derived from; defaults to `key`.
    pub bucket_by: Option<AttributeRef>,
    /// Context kind the bucketing attribute is read from.
    pub context_kind: String,
    /// Ordered weighted variations; the last entry absorbs remaining
    /// bucket mass.
    pub variations: Vec<WeightedVariation>,
}

impl Default for Rollout {
    fn default() -> Self {
        Rollout {
            kind: RolloutKind::Rollout,
            seed: None,
            bucket_by: None,
            context_kind: default_context_kind(),
            variations: Vec::new(),
        }
    }
}

/// One slice of a rollout.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeightedVariation {
    /// Index into [`Flag::variations`].
    pub variation: usize,
    /// Weight out of 100000.
    pub weight: u32,
    /// Exclude assignments to this slice from experiment reporting.
    pub untracked: bool,
}

impl WeightedVariation {
    /// Convenience constructor for a tracked slice.
    pub fn new(variation: usize, weight: u32) -> Self {
        Self {
            variation,
            weight,
            untracked: false,
        }
    }
}

/// An individual-targeting entry: serve `variation` to the listed keys.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Context kind the keys belong to; legacy targets default to `user`.
    #[serde(default = "default_context_kind")]
    pub context_kind: String,
    /// Variation to serve on a match.
    pub variation: usize,
    /// The targeted context keys.
    #[serde(default)]
    pub values: Vec<String>,
}

/// An ordered targeting rule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagRule {
    /// Stable rule identifier, surfaced in evaluation reasons.
    #[serde(default)]
    pub id: String,
    /// Conjunction of predicates; all must match.
    #[serde(default)]
    pub clauses: Vec<Clause>,
    /// What to serve on a match.
    #[serde(flatten)]
    pub variation_or_rollout: VariationOrRollout,
    /// Emit a full analytics event when this rule matches.
    #[serde(default)]
    pub track_events: bool,
}

/// A prerequisite: another flag that must currently evaluate to the stated
/// variation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prerequisite {
    /// Key of the prerequisite flag.
    pub key: String,
    /// Required variation index of the prerequisite flag.
    pub variation: usize,
}
