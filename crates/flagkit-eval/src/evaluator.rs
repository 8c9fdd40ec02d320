// SPDX-License-Identifier: MIT OR Apache-2.0
//! The evaluator: one flag, one context, one detail.

use crate::bucketing::resolve_variation;
use crate::error::EvalError;
use crate::rules::match_rule;
use crate::stack::EvaluationStack;
use flagkit_core::{
    Context, EvaluationDetail, EvaluationReason, Flag, Target, Value,
};
use flagkit_store::Store;
use tracing::error;

/// Data handed to a [`PrerequisiteEventSink`] after each prerequisite
/// evaluation.
pub struct PrerequisiteEvaluation<'a> {
    /// The prerequisite flag that was evaluated.
    pub prerequisite_flag: &'a Flag,
    /// Key of the flag whose evaluation required the prerequisite.
    pub prereq_of: &'a str,
    /// The prerequisite's evaluation result.
    pub detail: &'a EvaluationDetail<Value>,
    /// The context being evaluated.
    pub context: &'a Context,
}

/// Receives prerequisite evaluations so the caller can emit analytics
/// events for them.
pub trait PrerequisiteEventSink {
    /// Called once per prerequisite evaluated, regardless of outcome.
    fn record(&self, evaluation: PrerequisiteEvaluation<'_>);
}

/// A sink that drops everything, for internal evaluations such as
/// computing all-flags state.
pub struct NoopPrerequisiteSink;

impl PrerequisiteEventSink for NoopPrerequisiteSink {
    fn record(&self, _evaluation: PrerequisiteEvaluation<'_>) {}
}

/// Evaluates flags against a ruleset store.
///
/// Evaluation is pure with respect to a store snapshot: descriptors are
/// read through shared handles, so concurrent store updates never tear an
/// in-progress evaluation.
pub struct Evaluator<'a> {
    store: &'a dyn Store,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator reading from `store`.
    pub fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Evaluate `flag` for `context`.
    pub fn evaluate(
        &self,
        flag: &Flag,
        context: &Context,
        sink: &dyn PrerequisiteEventSink,
    ) -> EvaluationDetail<Value> {
        let mut stack = EvaluationStack::new();
        self.evaluate_internal("", flag, context, sink, &mut stack)
    }

    fn evaluate_internal(
        &self,
        parent_key: &str,
        flag: &Flag,
        context: &Context,
        sink: &dyn PrerequisiteEventSink,
        stack: &mut EvaluationStack,
    ) -> EvaluationDetail<Value> {
        if !stack.notice_flag(&flag.key) {
            self.log_error(parent_key, &EvalError::CyclicPrerequisite(flag.key.clone()));
            return self.off_value(flag, EvaluationReason::malformed_flag());
        }
        let detail = self.evaluate_guarded(flag, context, sink, stack);
        stack.forget_flag(&flag.key);
        detail
    }

    fn evaluate_guarded(
        &self,
        flag: &Flag,
        context: &Context,
        sink: &dyn PrerequisiteEventSink,
        stack: &mut EvaluationStack,
    ) -> EvaluationDetail<Value> {
        if !flag.on {
            return self.off_value(flag, EvaluationReason::Off);
        }

        for prereq in &flag.prerequisites {
            let Some(descriptor) = self.store.get_flag(&prereq.key) else {
                return self.off_value(
                    flag,
                    EvaluationReason::PrerequisiteFailed {
                        prerequisite_key: prereq.key.clone(),
                    },
                );
            };
            let Some(prereq_flag) = descriptor.item.as_ref() else {
                // The flag existed at some point but has been deleted.
                return self.off_value(
                    flag,
                    EvaluationReason::PrerequisiteFailed {
                        prerequisite_key: prereq.key.clone(),
                    },
                );
            };

            let prereq_detail =
                self.evaluate_internal(&flag.key, prereq_flag, context, sink, stack);

            if prereq_detail.reason.is_error() {
                return prereq_detail;
            }

            sink.record(PrerequisiteEvaluation {
                prerequisite_flag: prereq_flag,
                prereq_of: &flag.key,
                detail: &prereq_detail,
                context,
            });

            if !prereq_flag.on || prereq_detail.variation_index != Some(prereq.variation) {
                return self.off_value(
                    flag,
                    EvaluationReason::PrerequisiteFailed {
                        prerequisite_key: prereq.key.clone(),
                    },
                );
            }
        }

        // Targets are consulted before rules so individual targeting always
        // wins.
        if let Some(variation_index) = any_target_match_variation(context, flag) {
            return self.flag_variation(flag, variation_index, EvaluationReason::TargetMatch);
        }

        for (rule_index, rule) in flag.rules.iter().enumerate() {
            let matched = match match_rule(rule, context, self.store, stack) {
                Ok(matched) => matched,
                Err(err) => {
                    self.log_error(&flag.key, &err);
                    return EvaluationDetail::new(
                        Value::Null,
                        None,
                        EvaluationReason::malformed_flag(),
                    );
                }
            };
            if !matched {
                continue;
            }

            let result = match resolve_variation(
                &rule.variation_or_rollout,
                &flag.key,
                context,
                &flag.salt,
            ) {
                Ok(result) => result,
                Err(err) => {
                    self.log_error(&flag.key, &err);
                    return EvaluationDetail::new(
                        Value::Null,
                        None,
                        EvaluationReason::malformed_flag(),
                    );
                }
            };
            let reason = EvaluationReason::RuleMatch {
                rule_index,
                rule_id: rule.id.clone(),
                in_experiment: result.in_experiment,
            };
            return self.flag_variation(flag, result.variation_index, reason);
        }

        match resolve_variation(&flag.fallthrough, &flag.key, context, &flag.salt) {
            Ok(result) => {
                let reason = EvaluationReason::Fallthrough {
                    in_experiment: result.in_experiment,
                };
                self.flag_variation(flag, result.variation_index, reason)
            }
            Err(err) => {
                self.log_error(&flag.key, &err);
                EvaluationDetail::new(Value::Null, None, EvaluationReason::malformed_flag())
            }
        }
    }

    fn flag_variation(
        &self,
        flag: &Flag,
        variation_index: usize,
        reason: EvaluationReason,
    ) -> EvaluationDetail<Value> {
        match flag.variations.get(variation_index) {
            Some(value) => EvaluationDetail::new(value.clone(), Some(variation_index), reason),
            None => {
                self.log_error(
                    &flag.key,
                    &EvalError::NonexistentVariationIndex(variation_index),
                );
                EvaluationDetail::new(Value::Null, None, EvaluationReason::malformed_flag())
            }
        }
    }

    fn off_value(&self, flag: &Flag, reason: EvaluationReason) -> EvaluationDetail<Value> {
        match flag.off_variation {
            Some(index) => self.flag_variation(flag, index, reason),
            None => EvaluationDetail::new(Value::Null, None, reason),
        }
    }

    fn log_error(&self, key: &str, err: &EvalError) {
        error!(flag = key, "invalid flag configuration detected: {err}");
    }
}

fn any_target_match_variation(context: &Context, flag: &Flag) -> Option<usize> {
    if flag.context_targets.is_empty() {
        return flag
            .targets
            .iter()
            .find_map(|t| target_match_variation(context, t));
    }

    for context_target in &flag.context_targets {
        // An empty user context-target delegates to the legacy target with
        // the same variation, preserving the legacy list's ordering.
        if context_target.context_kind == "user" && context_target.values.is_empty() {
            for target in &flag.targets {
                if target.variation == context_target.variation {
                    if let Some(index) = target_match_variation(context, target) {
                        return Some(index);
                    }
                }
            }
        } else if let Some(index) = target_match_variation(context, context_target) {
            return Some(index);
        }
    }
    None
}

fn target_match_variation(context: &Context, target: &Target) -> Option<usize> {
    let key = context.key_for(&target.context_kind)?;
    target
        .values
        .iter()
        .any(|v| v == key)
        .then_some(target.variation)
}
