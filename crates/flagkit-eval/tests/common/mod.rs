// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for evaluator and rule tests.
#![allow(dead_code)]

use flagkit_core::{
    Clause, Context, Flag, FlagDescriptor, FlagRule, Operator, Rollout, RolloutKind, Segment,
    SegmentDescriptor, Target, Value, VariationOrRollout, WeightedVariation,
};
use flagkit_store::{Destination, MemoryStore};

pub fn user(key: &str) -> Context {
    Context::builder().kind("user", key).build()
}

pub fn store_with(flags: Vec<Flag>, segments: Vec<Segment>) -> MemoryStore {
    let store = MemoryStore::new();
    store.init(Default::default());
    for flag in flags {
        let key = flag.key.clone();
        store.upsert_flag(&key, FlagDescriptor::new(flag));
    }
    for segment in segments {
        let key = segment.key.clone();
        store.upsert_segment(&key, SegmentDescriptor::new(segment));
    }
    store
}

pub fn boolean_flag(key: &str) -> Flag {
    Flag {
        key: key.into(),
        version: 1,
        on: true,
        salt: "salt".into(),
        variations: vec![Value::Bool(false), Value::Bool(true)],
        off_variation: Some(0),
        fallthrough: VariationOrRollout::Variation { variation: 1 },
        ..Flag::default()
    }
}

pub fn target(variation: usize, keys: &[&str]) -> Target {
    Target {
        context_kind: "user".into(),
        variation,
        values: keys.iter().map(|k| (*k).to_owned()).collect(),
    }
}

pub fn clause(attribute: &str, op: Operator, values: Vec<Value>) -> Clause {
    Clause {
        attribute: attribute.into(),
        op,
        values,
        negate: false,
        context_kind: "user".into(),
    }
}

pub fn rule_with_variation(id: &str, clauses: Vec<Clause>, variation: usize) -> FlagRule {
    FlagRule {
        id: id.into(),
        clauses,
        variation_or_rollout: VariationOrRollout::Variation { variation },
        track_events: false,
    }
}

pub fn percent_rollout(weights: &[(usize, u32)]) -> VariationOrRollout {
    VariationOrRollout::Rollout {
        rollout: Rollout {
            kind: RolloutKind::Rollout,
            variations: weights
                .iter()
                .map(|(v, w)| WeightedVariation::new(*v, *w))
                .collect(),
            ..Rollout::default()
        },
    }
}
