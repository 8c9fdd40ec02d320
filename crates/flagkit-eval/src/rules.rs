// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rule, clause, and segment matching.

use crate::bucketing::{self, BucketPrefix};
use crate::error::EvalError;
use crate::operators;
use crate::stack::EvaluationStack;
use flagkit_core::{
    AttributeRef, Clause, Context, FlagRule, Operator, Segment, SegmentRule, SegmentTarget, Value,
};
use flagkit_store::Store;

fn maybe_negate(clause: &Clause, matched: bool) -> bool {
    if clause.negate { !matched } else { matched }
}

/// A flag rule matches when every clause matches.
pub(crate) fn match_rule(
    rule: &FlagRule,
    context: &Context,
    store: &dyn Store,
    stack: &mut EvaluationStack,
) -> Result<bool, EvalError> {
    for clause in &rule.clauses {
        if !match_clause(clause, context, store, stack)? {
            return Ok(false);
        }
    }
    Ok(true)
}

pub(crate) fn match_clause(
    clause: &Clause,
    context: &Context,
    store: &dyn Store,
    stack: &mut EvaluationStack,
) -> Result<bool, EvalError> {
    if clause.op == Operator::SegmentMatch {
        return match_segment_clause(clause, context, store, stack);
    }
    match_non_segment_clause(clause, context)
}

fn match_segment_clause(
    clause: &Clause,
    context: &Context,
    store: &dyn Store,
    stack: &mut EvaluationStack,
) -> Result<bool, EvalError> {
    for value in &clause.values {
        // Segment keys are strings; other value types are ignored, as are
        // keys with no corresponding segment.
        let Some(segment_key) = value.as_str() else {
            continue;
        };
        let Some(descriptor) = store.get_segment(segment_key) else {
            continue;
        };
        let Some(segment) = descriptor.item.as_ref() else {
            continue;
        };
        if contains_context(segment, context, store, stack)? {
            return Ok(maybe_negate(clause, true));
        }
    }
    Ok(maybe_negate(clause, false))
}

fn match_non_segment_clause(clause: &Clause, context: &Context) -> Result<bool, EvalError> {
    if !clause.attribute.is_valid() {
        return Err(EvalError::InvalidAttributeReference(
            clause.attribute.as_str().to_owned(),
        ));
    }

    // A clause on the `kind` meta-attribute matches if any kind in the
    // context satisfies the operator.
    if clause.attribute.is_kind() {
        for clause_value in &clause.values {
            for kind in context.kinds() {
                let kind_value = Value::from(kind);
                if operators::apply(clause.op, &kind_value, clause_value) {
                    return Ok(maybe_negate(clause, true));
                }
            }
        }
        return Ok(maybe_negate(clause, false));
    }

    let attribute = context.get(&clause.context_kind, &clause.attribute);
    if attribute.is_null() {
        // A missing attribute fails the clause without negation.
        return Ok(false);
    }

    if let Some(elements) = attribute.as_array() {
        for clause_value in &clause.values {
            for element in elements {
                if operators::apply(clause.op, element, clause_value) {
                    return Ok(maybe_negate(clause, true));
                }
            }
        }
        return Ok(maybe_negate(clause, false));
    }

    let matched = clause
        .values
        .iter()
        .any(|clause_value| operators::apply(clause.op, &attribute, clause_value));
    Ok(maybe_negate(clause, matched))
}

/// Whether a segment contains the context.
///
/// Order: unbounded short-circuit, inclusion lists, exclusion lists, then
/// rules. Re-entering a segment already on the stack is a configuration
/// cycle.
pub(crate) fn contains_context(
    segment: &Segment,
    context: &Context,
    store: &dyn Store,
    stack: &mut EvaluationStack,
) -> Result<bool, EvalError> {
    if !stack.notice_segment(&segment.key) {
        return Err(EvalError::CyclicSegment(segment.key.clone()));
    }
    let result = contains_context_inner(segment, context, store, stack);
    stack.forget_segment(&segment.key);
    result
}

fn contains_context_inner(
    segment: &Segment,
    context: &Context,
    store: &dyn Store,
    stack: &mut EvaluationStack,
) -> Result<bool, EvalError> {
    if segment.unbounded {
        // Membership of unbounded (big) segments lives in an external store
        // this SDK does not consult.
        return Ok(false);
    }

    if is_targeted(context, &segment.included, &segment.included_contexts) {
        return Ok(true);
    }
    if is_targeted(context, &segment.excluded, &segment.excluded_contexts) {
        return Ok(false);
    }

    for rule in &segment.rules {
        if match_segment_rule(rule, context, store, stack, &segment.key, &segment.salt)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn match_segment_rule(
    rule: &SegmentRule,
    context: &Context,
    store: &dyn Store,
    stack: &mut EvaluationStack,
    segment_key: &str,
    segment_salt: &str,
) -> Result<bool, EvalError> {
    for clause in &rule.clauses {
        if !match_clause(clause, context, store, stack)? {
            return Ok(false);
        }
    }

    let Some(weight) = rule.weight else {
        return Ok(true);
    };

    let key_ref = AttributeRef::new("key");
    let by_attr = rule.bucket_by.as_ref().unwrap_or(&key_ref);
    let prefix = BucketPrefix::KeyAndSalt(segment_key, segment_salt);
    let (bucket, _) = bucketing::bucket(
        context,
        by_attr,
        prefix,
        false,
        &rule.rollout_context_kind,
    )?;
    Ok(f64::from(bucket) < f64::from(weight) / 100_000.0)
}

fn is_targeted(context: &Context, keys: &[String], targets: &[SegmentTarget]) -> bool {
    // Legacy flat key lists apply only to plain user contexts with no
    // kind-scoped lists present.
    if context.is_user() && targets.is_empty() {
        return keys.iter().any(|k| k == context.canonical_key());
    }

    for target in targets {
        let Some(key) = context.key_for(&target.context_kind) else {
            continue;
        };
        if target.values.iter().any(|v| v == key) {
            return true;
        }
    }
    false
}
