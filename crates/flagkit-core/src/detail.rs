// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation results: the value, the variation index, and the reason.

use serde::{Deserialize, Serialize};

/// Why an evaluation could not produce a trusted value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The client has not yet ingested a ruleset.
    ClientNotReady,
    /// The supplied context failed validation.
    UserNotSpecified,
    /// The requested flag does not exist.
    FlagNotFound,
    /// The flag configuration is internally inconsistent.
    MalformedFlag,
    /// The value's type did not match the caller's expectation.
    WrongType,
    /// Any other internal failure.
    Exception,
}

/// How an evaluation arrived at its value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationReason {
    /// The flag was off.
    Off,
    /// No target or rule matched; the fallthrough variation applied.
    #[serde(rename_all = "camelCase")]
    Fallthrough {
        /// True when the fallthrough rollout is a tracked experiment slice.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        in_experiment: bool,
    },
    /// The context key was individually targeted.
    TargetMatch,
    /// A rule matched.
    #[serde(rename_all = "camelCase")]
    RuleMatch {
        /// Index of the matching rule in declaration order.
        rule_index: usize,
        /// The rule's identifier.
        rule_id: String,
        /// True when the rule rollout is a tracked experiment slice.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        in_experiment: bool,
    },
    /// A prerequisite flag did not produce the required variation.
    #[serde(rename_all = "camelCase")]
    PrerequisiteFailed {
        /// Key of the failing prerequisite flag.
        prerequisite_key: String,
    },
    /// The evaluation failed; the default value was served.
    #[serde(rename_all = "camelCase")]
    Error {
        /// What went wrong.
        error_kind: ErrorKind,
    },
}

impl EvaluationReason {
    /// Shorthand for an error reason.
    pub fn error(kind: ErrorKind) -> Self {
        EvaluationReason::Error { error_kind: kind }
    }

    /// Shorthand for a malformed-flag error reason.
    pub fn malformed_flag() -> Self {
        Self::error(ErrorKind::MalformedFlag)
    }

    /// True if this reason is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, EvaluationReason::Error { .. })
    }

    /// True if this reason reports a tracked experiment assignment.
    pub fn in_experiment(&self) -> bool {
        match self {
            EvaluationReason::Fallthrough { in_experiment } => *in_experiment,
            EvaluationReason::RuleMatch { in_experiment, .. } => *in_experiment,
            _ => false,
        }
    }
}

/// The full result of evaluating one flag for one context.
#[derive(Clone, Debug, PartialEq)]
pub struct EvaluationDetail<T> {
    /// The evaluated (or default) value.
    pub value: T,
    /// Index into the flag's variations, when one was selected.
    pub variation_index: Option<usize>,
    /// How the value was produced.
    pub reason: EvaluationReason,
}

impl<T> EvaluationDetail<T> {
    /// A detail carrying a selected variation.
    pub fn new(value: T, variation_index: Option<usize>, reason: EvaluationReason) -> Self {
        Self {
            value,
            variation_index,
            reason,
        }
    }

    /// A detail for a failed evaluation: the caller's default and an error
    /// reason, with no variation index.
    pub fn error(kind: ErrorKind, default_value: T) -> Self {
        Self {
            value: default_value,
            variation_index: None,
            reason: EvaluationReason::error(kind),
        }
    }

    /// Map the value while preserving index and reason.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EvaluationDetail<U> {
        EvaluationDetail {
            value: f(self.value),
            variation_index: self.variation_index,
            reason: self.reason,
        }
    }
}
