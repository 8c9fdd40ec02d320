// SPDX-License-Identifier: MIT OR Apache-2.0
//! Rollout bucketing: hashing a context attribute into `[0, 1)`.
//!
//! The bucket is the first 60 bits of `SHA1(prefix + "." + value)` divided
//! by `0x0FFFFFFFFFFFFFFF`. The prefix is either `flagKey.salt` or, for
//! seeded experiments, the decimal seed; seeded and unseeded rollouts
//! therefore draw from unrelated hash spaces.

use crate::error::EvalError;
use flagkit_core::{AttributeRef, Context, Rollout, RolloutKind, Value, VariationOrRollout};
use sha1::{Digest, Sha1};
use std::fmt::Write as _;

const BUCKET_SCALE: f64 = 0x0FFF_FFFF_FFFF_FFFF_u64 as f64;

/// The hash-input prefix for one rollout.
#[derive(Clone, Copy, Debug)]
pub enum BucketPrefix<'a> {
    /// `flagKey.salt` — the default for rollouts.
    KeyAndSalt(&'a str, &'a str),
    /// A decimal experiment seed.
    Seed(i64),
}

impl BucketPrefix<'_> {
    fn write_to(&self, out: &mut String) {
        match self {
            BucketPrefix::KeyAndSalt(key, salt) => {
                out.push_str(key);
                out.push('.');
                out.push_str(salt);
            }
            BucketPrefix::Seed(seed) => {
                let _ = write!(out, "{seed}");
            }
        }
    }
}

/// Whether the context contained the kind a rollout buckets on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KindPresence {
    /// The kind was present.
    Present,
    /// The kind was absent; the context is not part of the rollout's
    /// population.
    Absent,
}

/// Outcome of resolving a variation-or-rollout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketResult {
    /// The selected variation index.
    pub variation_index: usize,
    /// True when the assignment belongs to a tracked experiment slice.
    pub in_experiment: bool,
}

/// Hash a context attribute to a bucket in `[0, 1)`.
///
/// Experiments always bucket on `key` regardless of `attr_ref`. A context
/// lacking `context_kind` entirely buckets to `(0.0, Absent)`, which is how
/// contexts outside an experiment's population avoid being placed in it.
pub fn bucket(
    context: &Context,
    attr_ref: &AttributeRef,
    prefix: BucketPrefix<'_>,
    is_experiment: bool,
    context_kind: &str,
) -> Result<(f32, KindPresence), EvalError> {
    let key_ref = AttributeRef::new("key");
    let reference = if is_experiment { &key_ref } else { attr_ref };
    if !reference.is_valid() {
        return Err(EvalError::InvalidAttributeReference(
            reference.as_str().to_owned(),
        ));
    }

    let value = context.get(context_kind, reference);
    if value.is_string() || value.is_number() {
        let bucket = compute_bucket(&value, prefix).unwrap_or(0.0);
        return Ok((bucket, KindPresence::Present));
    }

    let presence = if context.has_kind(context_kind) {
        KindPresence::Present
    } else {
        KindPresence::Absent
    };
    Ok((0.0, presence))
}

fn compute_bucket(value: &Value, prefix: BucketPrefix<'_>) -> Option<f32> {
    let id = bucket_value(value)?;

    let mut input = String::new();
    prefix.write_to(&mut input);
    input.push('.');
    input.push_str(&id);

    let digest = Sha1::digest(input.as_bytes());
    let hexed = hex::encode(digest);
    let first_15 = &hexed[..15];
    let as_number = u64::from_str_radix(first_15, 16).ok()?;
    Some((as_number as f64 / BUCKET_SCALE) as f32)
}

/// Stringify a bucketable value. Strings pass through; non-negative
/// integers use their decimal form; everything else (floats with a
/// fractional part, negative numbers) is not bucketable.
fn bucket_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.trunc() == *n && *n >= 0.0 => Some(format!("{}", *n as i64)),
        _ => None,
    }
}

/// Resolve a fixed variation or a rollout for the given context.
pub fn resolve_variation(
    vor: &VariationOrRollout,
    flag_key: &str,
    context: &Context,
    salt: &str,
) -> Result<BucketResult, EvalError> {
    match vor {
        VariationOrRollout::Variation { variation } => Ok(BucketResult {
            variation_index: *variation,
            in_experiment: false,
        }),
        VariationOrRollout::Rollout { rollout } => resolve_rollout(rollout, flag_key, context, salt),
    }
}

fn resolve_rollout(
    rollout: &Rollout,
    flag_key: &str,
    context: &Context,
    salt: &str,
) -> Result<BucketResult, EvalError> {
    let Some(first) = rollout.variations.first() else {
        return Err(EvalError::RolloutMissingVariations);
    };

    let is_experiment = rollout.kind == RolloutKind::Experiment;
    let prefix = match rollout.seed {
        Some(seed) => BucketPrefix::Seed(seed),
        None => BucketPrefix::KeyAndSalt(flag_key, salt),
    };
    let key_ref = AttributeRef::new("key");
    let by_attr = rollout.bucket_by.as_ref().unwrap_or(&key_ref);

    let (bucket_value, presence) = bucket(
        context,
        by_attr,
        prefix,
        is_experiment,
        &rollout.context_kind,
    )?;

    if presence == KindPresence::Absent {
        return Ok(BucketResult {
            variation_index: first.variation,
            in_experiment: false,
        });
    }

    let mut cumulative = 0.0_f64;
    for weighted in &rollout.variations {
        cumulative += f64::from(weighted.weight) / 100_000.0;
        if f64::from(bucket_value) < cumulative {
            return Ok(BucketResult {
                variation_index: weighted.variation,
                in_experiment: is_experiment && !weighted.untracked,
            });
        }
    }

    // The bucket fell past the total weight; pin to the last variation.
    let last = rollout
        .variations
        .last()
        .ok_or(EvalError::RolloutMissingVariations)?;
    Ok(BucketResult {
        variation_index: last.variation,
        in_experiment: is_experiment && !last.untracked,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(key: &str) -> Context {
        Context::builder().kind("user", key).build()
    }

    #[test]
    fn known_bucket_values() {
        let cases = [
            ("userKeyA", 0.42157587_f32),
            ("userKeyB", 0.6708485),
            ("userKeyC", 0.10343106),
        ];
        for (key, expected) in cases {
            let (b, presence) = bucket(
                &user(key),
                &AttributeRef::new("key"),
                BucketPrefix::KeyAndSalt("hashKey", "saltyA"),
                false,
                "user",
            )
            .unwrap();
            assert!((b - expected).abs() < 1e-7, "{key}: {b} != {expected}");
            assert_eq!(presence, KindPresence::Present);
        }
    }

    #[test]
    fn known_seeded_bucket_values() {
        let cases = [
            ("userKeyA", 0.09801207_f32),
            ("userKeyB", 0.14483777),
            ("userKeyC", 0.9242641),
        ];
        for (key, expected) in cases {
            let (b, _) = bucket(
                &user(key),
                &AttributeRef::new("key"),
                BucketPrefix::Seed(61),
                false,
                "user",
            )
            .unwrap();
            assert!((b - expected).abs() < 1e-7, "{key}: {b} != {expected}");
        }
    }

    #[test]
    fn seeded_and_unseeded_prefixes_disagree() {
        let (seeded, _) = bucket(
            &user("userKeyA"),
            &AttributeRef::new("key"),
            BucketPrefix::Seed(61),
            false,
            "user",
        )
        .unwrap();
        let (unseeded, _) = bucket(
            &user("userKeyA"),
            &AttributeRef::new("key"),
            BucketPrefix::KeyAndSalt("hashKey", "saltyA"),
            false,
            "user",
        )
        .unwrap();
        assert_ne!(seeded, unseeded);
    }

    #[test]
    fn integer_attributes_bucket_like_their_decimal_string() {
        let ctx_int = Context::builder()
            .kind("user", "x")
            .set("intAttr", 33_i64)
            .build();
        let ctx_str = Context::builder()
            .kind("user", "x")
            .set("stringAttr", "33")
            .build();
        let prefix = BucketPrefix::KeyAndSalt("hashKey", "saltyA");
        let (a, _) = bucket(&ctx_int, &AttributeRef::new("intAttr"), prefix, false, "user").unwrap();
        let (b, _) =
            bucket(&ctx_str, &AttributeRef::new("stringAttr"), prefix, false, "user").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn fractional_and_negative_numbers_bucket_to_zero() {
        for value in [1.5_f64, -5.0] {
            let ctx = Context::builder()
                .kind("user", "x")
                .set("attr", value)
                .build();
            let (b, presence) = bucket(
                &ctx,
                &AttributeRef::new("attr"),
                BucketPrefix::KeyAndSalt("hashKey", "saltyA"),
                false,
                "user",
            )
            .unwrap();
            assert_eq!(b, 0.0);
            assert_eq!(presence, KindPresence::Present);
        }
    }

    #[test]
    fn missing_kind_is_absent() {
        let (b, presence) = bucket(
            &user("x"),
            &AttributeRef::new("key"),
            BucketPrefix::KeyAndSalt("hashKey", "saltyA"),
            false,
            "org",
        )
        .unwrap();
        assert_eq!(b, 0.0);
        assert_eq!(presence, KindPresence::Absent);
    }

    #[test]
    fn invalid_reference_fails_fast() {
        let err = bucket(
            &user("x"),
            &AttributeRef::new("//"),
            BucketPrefix::KeyAndSalt("hashKey", "saltyA"),
            false,
            "user",
        )
        .unwrap_err();
        assert!(matches!(err, EvalError::InvalidAttributeReference(_)));
    }

    #[test]
    fn empty_rollout_is_an_error() {
        let rollout = Rollout::default();
        let err = resolve_rollout(&rollout, "f", &user("x"), "salt").unwrap_err();
        assert_eq!(err, EvalError::RolloutMissingVariations);
    }
}
