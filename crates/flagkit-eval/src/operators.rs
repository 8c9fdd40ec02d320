// SPDX-License-Identifier: MIT OR Apache-2.0
//! The clause operator library.
//!
//! Every operator is total: a type mismatch, an unparseable timestamp or
//! version, or an invalid regex yields `false` rather than an error.
//! Negation is applied at the clause level, not here.

use chrono::DateTime;
use flagkit_core::{Operator, Value};
use regex::Regex;
use semver::Version;
use std::cmp::Ordering;

/// Apply `op` to a context value and one clause value.
pub fn apply(op: Operator, context_value: &Value, clause_value: &Value) -> bool {
    match op {
        Operator::In => context_value == clause_value,
        Operator::StartsWith => {
            string_op(context_value, clause_value, |c, v| c.starts_with(v))
        }
        Operator::EndsWith => string_op(context_value, clause_value, |c, v| c.ends_with(v)),
        Operator::Contains => string_op(context_value, clause_value, |c, v| c.contains(v)),
        Operator::Matches => string_op(context_value, clause_value, |c, pattern| {
            Regex::new(pattern).map(|re| re.is_match(c)).unwrap_or(false)
        }),
        Operator::LessThan => numeric_op(context_value, clause_value, |c, v| c < v),
        Operator::LessThanOrEqual => numeric_op(context_value, clause_value, |c, v| c <= v),
        Operator::GreaterThan => numeric_op(context_value, clause_value, |c, v| c > v),
        Operator::GreaterThanOrEqual => numeric_op(context_value, clause_value, |c, v| c >= v),
        Operator::Before => time_op(context_value, clause_value, |c, v| c < v),
        Operator::After => time_op(context_value, clause_value, |c, v| c > v),
        Operator::SemVerEqual => semver_op(context_value, clause_value, Ordering::is_eq),
        Operator::SemVerLessThan => semver_op(context_value, clause_value, Ordering::is_lt),
        Operator::SemVerGreaterThan => semver_op(context_value, clause_value, Ordering::is_gt),
        // segmentMatch is resolved by the rule matcher, which needs store
        // access; reaching here means a malformed clause.
        Operator::SegmentMatch => false,
        Operator::Unknown => false,
    }
}

fn string_op(
    context_value: &Value,
    clause_value: &Value,
    op: impl Fn(&str, &str) -> bool,
) -> bool {
    match (context_value.as_str(), clause_value.as_str()) {
        (Some(c), Some(v)) => op(c, v),
        _ => false,
    }
}

fn numeric_op(
    context_value: &Value,
    clause_value: &Value,
    op: impl Fn(f64, f64) -> bool,
) -> bool {
    match (context_value.as_f64(), clause_value.as_f64()) {
        (Some(c), Some(v)) => op(c, v),
        _ => false,
    }
}

fn time_op(
    context_value: &Value,
    clause_value: &Value,
    op: impl Fn(i64, i64) -> bool,
) -> bool {
    match (to_micros(context_value), to_micros(clause_value)) {
        (Some(c), Some(v)) => op(c, v),
        _ => false,
    }
}

/// Interpret a value as microseconds since the epoch. Numbers are
/// milliseconds; strings are RFC 3339. Sub-microsecond precision is
/// truncated so nanosecond-level differences compare equal.
fn to_micros(value: &Value) -> Option<i64> {
    match value {
        Value::Number(ms) => Some((ms * 1000.0).trunc() as i64),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.timestamp_micros()),
        _ => None,
    }
}

fn semver_op(
    context_value: &Value,
    clause_value: &Value,
    check: impl Fn(Ordering) -> bool,
) -> bool {
    match (parse_semver(context_value), parse_semver(clause_value)) {
        (Some(c), Some(v)) => check(c.cmp_precedence(&v)),
        _ => false,
    }
}

/// Parse a semantic version, completing partial versions (`"2"`, `"2.1"`)
/// with zero components. Build metadata is ignored for comparison via
/// `cmp_precedence`.
fn parse_semver(value: &Value) -> Option<Version> {
    let raw = value.as_str()?;
    Version::parse(raw)
        .ok()
        .or_else(|| Version::parse(&pad_partial_version(raw)?).ok())
}

fn pad_partial_version(raw: &str) -> Option<String> {
    // Split the leading numeric core from any prerelease/build suffix.
    let suffix_start = raw
        .find(|c: char| c == '-' || c == '+')
        .unwrap_or(raw.len());
    let (core, suffix) = raw.split_at(suffix_start);
    if core.is_empty() || !core.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    match core.chars().filter(|c| *c == '.').count() {
        0 => Some(format!("{core}.0.0{suffix}")),
        1 => Some(format!("{core}.0{suffix}")),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn n(v: f64) -> Value {
        Value::Number(v)
    }

    #[test]
    fn in_op_compares_structurally() {
        assert!(apply(Operator::In, &n(99.0), &n(99.0)));
        assert!(apply(Operator::In, &Value::from(99_i64), &n(99.0)));
        assert!(!apply(Operator::In, &s("99"), &n(99.0)));
        assert!(apply(Operator::In, &Value::Bool(true), &Value::Bool(true)));
    }

    #[test]
    fn string_ops_require_strings() {
        assert!(apply(Operator::StartsWith, &s("catdog"), &s("cat")));
        assert!(apply(Operator::EndsWith, &s("catdog"), &s("dog")));
        assert!(apply(Operator::Contains, &s("catdog"), &s("td")));
        assert!(!apply(Operator::StartsWith, &n(7.0), &s("7")));
        assert!(!apply(Operator::Contains, &s("7"), &n(7.0)));
    }

    #[test]
    fn matches_is_a_partial_regex_match() {
        assert!(apply(Operator::Matches, &s("hello world"), &s("wor.d")));
        assert!(!apply(Operator::Matches, &s("hello"), &s("^world$")));
    }

    #[test]
    fn matches_is_false_on_invalid_pattern() {
        assert!(!apply(Operator::Matches, &s("anything"), &s("[unclosed")));
    }

    #[test]
    fn numeric_comparisons() {
        assert!(apply(Operator::LessThan, &n(1.0), &n(1.5)));
        assert!(apply(Operator::LessThanOrEqual, &n(1.5), &n(1.5)));
        assert!(apply(Operator::GreaterThan, &n(2.0), &n(1.5)));
        assert!(apply(Operator::GreaterThanOrEqual, &n(1.5), &n(1.5)));
        assert!(!apply(Operator::LessThan, &s("1"), &n(2.0)));
    }

    #[test]
    fn date_ops_accept_rfc3339_and_millis() {
        let early = s("2024-05-21T12:00:00Z");
        let late = s("2024-05-21T12:00:01Z");
        assert!(apply(Operator::Before, &early, &late));
        assert!(apply(Operator::After, &late, &early));

        // 2024-05-21T12:00:00Z in milliseconds.
        let early_ms = n(1_716_292_800_000.0);
        assert!(apply(Operator::Before, &early_ms, &late));
        assert!(!apply(Operator::Before, &s("not a date"), &late));
    }

    #[test]
    fn date_ops_truncate_to_microseconds() {
        let a = s("2024-05-21T12:00:00.0000001Z");
        let b = s("2024-05-21T12:00:00.0000002Z");
        assert!(!apply(Operator::Before, &a, &b));
        assert!(!apply(Operator::After, &a, &b));
    }

    #[test]
    fn semver_partial_versions_are_padded() {
        assert!(apply(Operator::SemVerEqual, &s("2"), &s("2.0.0")));
        assert!(apply(Operator::SemVerEqual, &s("2.1"), &s("2.1.0")));
        assert!(apply(Operator::SemVerLessThan, &s("2.1"), &s("2.2")));
    }

    #[test]
    fn semver_prerelease_and_build_semantics() {
        assert!(apply(
            Operator::SemVerLessThan,
            &s("2.0.0-rc.1"),
            &s("2.0.0")
        ));
        // Numeric prerelease components compare numerically.
        assert!(apply(
            Operator::SemVerLessThan,
            &s("2.0.0-rc.2"),
            &s("2.0.0-rc.10")
        ));
        // Build metadata is ignored for equality.
        assert!(apply(
            Operator::SemVerEqual,
            &s("2.0.0+build1"),
            &s("2.0.0+build2")
        ));
    }

    #[test]
    fn semver_invalid_versions_are_false() {
        assert!(!apply(Operator::SemVerEqual, &s("hello"), &s("2.0.0")));
        assert!(!apply(Operator::SemVerGreaterThan, &n(2.0), &s("1.0.0")));
    }
}
