// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clauses: the predicates inside flag and segment rules.

use crate::attributes::AttributeRef;
use crate::value::Value;
use serde::{Deserialize, Serialize};

/// The comparison applied by a clause.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Structural equality against any clause value.
    #[serde(rename = "in")]
    In,
    /// String prefix test.
    #[serde(rename = "startsWith")]
    StartsWith,
    /// String suffix test.
    #[serde(rename = "endsWith")]
    EndsWith,
    /// Regular-expression match.
    #[serde(rename = "matches")]
    Matches,
    /// Substring test.
    #[serde(rename = "contains")]
    Contains,
    /// Numeric `<`.
    #[serde(rename = "lessThan")]
    LessThan,
    /// Numeric `<=`.
    #[serde(rename = "lessThanOrEqual")]
    LessThanOrEqual,
    /// Numeric `>`.
    #[serde(rename = "greaterThan")]
    GreaterThan,
    /// Numeric `>=`.
    #[serde(rename = "greaterThanOrEqual")]
    GreaterThanOrEqual,
    /// Timestamp strictly earlier.
    #[serde(rename = "before")]
    Before,
    /// Timestamp strictly later.
    #[serde(rename = "after")]
    After,
    /// Semantic-version equality.
    #[serde(rename = "semVerEqual")]
    SemVerEqual,
    /// Semantic-version `<`.
    #[serde(rename = "semVerLessThan")]
    SemVerLessThan,
    /// Semantic-version `>`.
    #[serde(rename = "semVerGreaterThan")]
    SemVerGreaterThan,
    /// Clause values are segment keys; match if any segment contains the
    /// context.
    #[serde(rename = "segmentMatch")]
    SegmentMatch,
    /// An operator this SDK revision does not know; never matches.
    #[serde(other)]
    Unknown,
}

fn default_context_kind() -> String {
    "user".to_owned()
}

/// A single predicate over a context attribute.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clause {
    /// The attribute to test.
    #[serde(default)]
    pub attribute: AttributeRef,
    /// The comparison to apply.
    pub op: Operator,
    /// Operands; the clause matches if any operand satisfies the operator.
    #[serde(default)]
    pub values: Vec<Value>,
    /// Invert the result.
    #[serde(default)]
    pub negate: bool,
    /// Which context kind the attribute is read from.
    #[serde(default = "default_context_kind")]
    pub context_kind: String,
}
