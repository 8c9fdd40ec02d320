// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rule, clause, and segment matching through the evaluator.

mod common;

use common::{boolean_flag, clause, rule_with_variation, store_with, user};
use flagkit_core::{
    Clause, Context, EvaluationReason, Operator, Segment, SegmentRule, SegmentTarget, Value,
};
use flagkit_eval::{Evaluator, NoopPrerequisiteSink};

fn evaluate(
    store: &flagkit_store::MemoryStore,
    flag: &flagkit_core::Flag,
    context: &Context,
) -> flagkit_core::EvaluationDetail<Value> {
    Evaluator::new(store).evaluate(flag, context, &NoopPrerequisiteSink)
}

#[test]
fn rule_match_reports_index_and_id() {
    let mut flag = boolean_flag("f");
    flag.rules = vec![
        rule_with_variation(
            "first",
            vec![clause("name", Operator::In, vec![Value::from("nobody")])],
            0,
        ),
        rule_with_variation(
            "second",
            vec![clause("email", Operator::EndsWith, vec![Value::from("@corp.io")])],
            0,
        ),
    ];
    let store = store_with(vec![flag.clone()], vec![]);

    let ctx = Context::builder()
        .kind("user", "u")
        .set("email", "dev@corp.io")
        .build();
    let detail = evaluate(&store, &flag, &ctx);
    assert_eq!(detail.variation_index, Some(0));
    assert_eq!(
        detail.reason,
        EvaluationReason::RuleMatch {
            rule_index: 1,
            rule_id: "second".into(),
            in_experiment: false
        }
    );
}

#[test]
fn all_clauses_must_match() {
    let mut flag = boolean_flag("f");
    flag.rules = vec![rule_with_variation(
        "r",
        vec![
            clause("email", Operator::EndsWith, vec![Value::from("@corp.io")]),
            clause("plan", Operator::In, vec![Value::from("enterprise")]),
        ],
        0,
    )];
    let store = store_with(vec![flag.clone()], vec![]);

    let ctx = Context::builder()
        .kind("user", "u")
        .set("email", "dev@corp.io")
        .set("plan", "free")
        .build();
    let detail = evaluate(&store, &flag, &ctx);
    assert_eq!(
        detail.reason,
        EvaluationReason::Fallthrough {
            in_experiment: false
        }
    );
}

#[test]
fn negated_clause_inverts_the_match() {
    let mut flag = boolean_flag("f");
    let mut negated = clause("plan", Operator::In, vec![Value::from("free")]);
    negated.negate = true;
    flag.rules = vec![rule_with_variation("r", vec![negated], 0)];
    let store = store_with(vec![flag.clone()], vec![]);

    let paid = Context::builder()
        .kind("user", "u")
        .set("plan", "enterprise")
        .build();
    assert_eq!(
        evaluate(&store, &flag, &paid).reason,
        EvaluationReason::RuleMatch {
            rule_index: 0,
            rule_id: "r".into(),
            in_experiment: false
        }
    );

    let free = Context::builder()
        .kind("user", "u")
        .set("plan", "free")
        .build();
    assert!(matches!(
        evaluate(&store, &flag, &free).reason,
        EvaluationReason::Fallthrough { .. }
    ));
}

#[test]
fn missing_attribute_fails_even_when_negated() {
    let mut flag = boolean_flag("f");
    let mut negated = clause("plan", Operator::In, vec![Value::from("free")]);
    negated.negate = true;
    flag.rules = vec![rule_with_variation("r", vec![negated], 0)];
    let store = store_with(vec![flag.clone()], vec![]);

    // No "plan" attribute at all: the clause fails outright, negation is
    // not applied.
    assert!(matches!(
        evaluate(&store, &flag, &user("u")).reason,
        EvaluationReason::Fallthrough { .. }
    ));
}

#[test]
fn kind_clause_matches_any_context_kind() {
    let mut flag = boolean_flag("f");
    flag.rules = vec![rule_with_variation(
        "r",
        vec![clause("kind", Operator::In, vec![Value::from("org")])],
        0,
    )];
    let store = store_with(vec![flag.clone()], vec![]);

    let multi = Context::builder()
        .kind("user", "u")
        .kind("org", "acme")
        .build();
    assert!(matches!(
        evaluate(&store, &flag, &multi).reason,
        EvaluationReason::RuleMatch { .. }
    ));

    assert!(matches!(
        evaluate(&store, &flag, &user("u")).reason,
        EvaluationReason::Fallthrough { .. }
    ));
}

#[test]
fn array_attribute_matches_any_element() {
    let mut flag = boolean_flag("f");
    flag.rules = vec![rule_with_variation(
        "r",
        vec![clause("groups", Operator::In, vec![Value::from("beta")])],
        0,
    )];
    let store = store_with(vec![flag.clone()], vec![]);

    let ctx = Context::builder()
        .kind("user", "u")
        .set(
            "groups",
            Value::Array(vec![Value::from("alpha"), Value::from("beta")]),
        )
        .build();
    assert!(matches!(
        evaluate(&store, &flag, &ctx).reason,
        EvaluationReason::RuleMatch { .. }
    ));
}

#[test]
fn invalid_clause_attribute_is_malformed() {
    let mut flag = boolean_flag("f");
    flag.rules = vec![rule_with_variation(
        "r",
        vec![clause("//", Operator::In, vec![Value::from("x")])],
        0,
    )];
    let store = store_with(vec![flag.clone()], vec![]);

    let detail = evaluate(&store, &flag, &user("u"));
    assert_eq!(detail.reason, EvaluationReason::malformed_flag());
}

fn segment_match_flag(segment_keys: &[&str]) -> flagkit_core::Flag {
    let mut flag = boolean_flag("f");
    flag.rules = vec![rule_with_variation(
        "seg-rule",
        vec![Clause {
            attribute: "".into(),
            op: Operator::SegmentMatch,
            values: segment_keys.iter().map(|k| Value::from(*k)).collect(),
            negate: false,
            context_kind: "user".into(),
        }],
        0,
    )];
    flag
}

#[test]
fn segment_included_and_excluded_lists() {
    let segment = Segment {
        key: "beta".into(),
        version: 1,
        salt: "s".into(),
        included: vec!["alice".into()],
        excluded: vec!["bob".into()],
        rules: vec![SegmentRule {
            clauses: vec![clause("key", Operator::In, vec![Value::from("bob")])],
            bucket_by: None,
            rollout_context_kind: "user".into(),
            weight: None,
        }],
        ..Segment::default()
    };
    let flag = segment_match_flag(&["beta"]);
    let store = store_with(vec![flag.clone()], vec![segment]);

    // Included wins immediately.
    assert!(matches!(
        evaluate(&store, &flag, &user("alice")).reason,
        EvaluationReason::RuleMatch { .. }
    ));
    // Excluded wins over a matching rule.
    assert!(matches!(
        evaluate(&store, &flag, &user("bob")).reason,
        EvaluationReason::Fallthrough { .. }
    ));
}

#[test]
fn segment_context_targets_apply_per_kind() {
    let segment = Segment {
        key: "orgs".into(),
        version: 1,
        salt: "s".into(),
        included_contexts: vec![SegmentTarget {
            context_kind: "org".into(),
            values: vec!["acme".into()],
        }],
        ..Segment::default()
    };
    let flag = segment_match_flag(&["orgs"]);
    let store = store_with(vec![flag.clone()], vec![segment]);

    let ctx = Context::builder().kind("org", "acme").build();
    assert!(matches!(
        evaluate(&store, &flag, &ctx).reason,
        EvaluationReason::RuleMatch { .. }
    ));
}

#[test]
fn missing_segments_are_ignored() {
    let flag = segment_match_flag(&["nonexistent"]);
    let store = store_with(vec![flag.clone()], vec![]);

    assert!(matches!(
        evaluate(&store, &flag, &user("u")).reason,
        EvaluationReason::Fallthrough { .. }
    ));
}

#[test]
fn unbounded_segment_never_matches() {
    let segment = Segment {
        key: "big".into(),
        version: 1,
        salt: "s".into(),
        unbounded: true,
        included: vec!["alice".into()],
        ..Segment::default()
    };
    let flag = segment_match_flag(&["big"]);
    let store = store_with(vec![flag.clone()], vec![segment]);

    assert!(matches!(
        evaluate(&store, &flag, &user("alice")).reason,
        EvaluationReason::Fallthrough { .. }
    ));
}

#[test]
fn weighted_segment_rule_buckets_contexts() {
    // With a full weight the rule always matches; with zero weight never.
    for (weight, expect_match) in [(100_000_u32, true), (0, false)] {
        let segment = Segment {
            key: "weighted".into(),
            version: 1,
            salt: "salt".into(),
            rules: vec![SegmentRule {
                clauses: vec![],
                bucket_by: None,
                rollout_context_kind: "user".into(),
                weight: Some(weight),
            }],
            ..Segment::default()
        };
        let flag = segment_match_flag(&["weighted"]);
        let store = store_with(vec![flag.clone()], vec![segment]);

        let matched = matches!(
            evaluate(&store, &flag, &user("userKeyA")).reason,
            EvaluationReason::RuleMatch { .. }
        );
        assert_eq!(matched, expect_match, "weight {weight}");
    }
}

#[test]
fn segment_cycle_is_malformed() {
    let make = |key: &str, other: &str| Segment {
        key: key.into(),
        version: 1,
        salt: "s".into(),
        rules: vec![SegmentRule {
            clauses: vec![Clause {
                attribute: "".into(),
                op: Operator::SegmentMatch,
                values: vec![Value::from(other)],
                negate: false,
                context_kind: "user".into(),
            }],
            bucket_by: None,
            rollout_context_kind: "user".into(),
            weight: None,
        }],
        ..Segment::default()
    };
    let flag = segment_match_flag(&["segA"]);
    let store = store_with(
        vec![flag.clone()],
        vec![make("segA", "segB"), make("segB", "segA")],
    );

    let detail = evaluate(&store, &flag, &user("u"));
    assert_eq!(detail.reason, EvaluationReason::malformed_flag());
}
