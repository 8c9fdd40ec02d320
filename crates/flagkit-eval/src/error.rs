// SPDX-License-Identifier: MIT OR Apache-2.0
//! Internal evaluation failures.
//!
//! These never escape to the host; the evaluator logs them and reports a
//! `MALFORMED_FLAG` reason instead.

use thiserror::Error;

/// A flag or segment configuration problem found during evaluation.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalError {
    /// A clause or rollout referenced an attribute that failed to parse.
    #[error("invalid attribute reference \"{0}\"")]
    InvalidAttributeReference(String),

    /// A prerequisite chain revisited a flag already on the evaluation
    /// stack.
    #[error("circular reference detected in prerequisites of flag \"{0}\"")]
    CyclicPrerequisite(String),

    /// A segment-match chain revisited a segment already on the evaluation
    /// stack.
    #[error("circular reference detected in segment \"{0}\"")]
    CyclicSegment(String),

    /// A variation index pointed outside the flag's variation list.
    #[error("variation index {0} is out of range")]
    NonexistentVariationIndex(usize),

    /// A rollout carried no weighted variations.
    #[error("rollout has no variations")]
    RolloutMissingVariations,
}
