// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation summarization: per-flag, per-variation counters.

use crate::events::EvalEvent;
use flagkit_core::Value;
use serde_json::json;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CounterKey {
    variation: Option<usize>,
    version: Option<u64>,
}

#[derive(Clone, Debug)]
struct Counter {
    value: Value,
    count: u64,
}

#[derive(Clone, Debug)]
struct FlagSummary {
    default_value: Value,
    context_kinds: BTreeSet<String>,
    counters: HashMap<CounterKey, Counter>,
}

/// Aggregates evaluation events between flushes.
///
/// Counters key on `(variation, version)`; evaluations of unknown flags
/// (no version) count under an `unknown` marker. First-seen and last-seen
/// timestamps bound the summary window.
#[derive(Clone, Debug, Default)]
pub struct Summarizer {
    start_date: Option<i64>,
    end_date: Option<i64>,
    features: HashMap<String, FlagSummary>,
}

impl Summarizer {
    /// An empty summarizer.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when nothing has been recorded since the last reset.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Fold one evaluation into the summary.
    pub fn update(&mut self, event: &EvalEvent) {
        self.start_date = Some(match self.start_date {
            Some(start) => start.min(event.creation_date),
            None => event.creation_date,
        });
        self.end_date = Some(match self.end_date {
            Some(end) => end.max(event.creation_date),
            None => event.creation_date,
        });

        let summary = self
            .features
            .entry(event.flag_key.clone())
            .or_insert_with(|| FlagSummary {
                default_value: event.default_value.clone(),
                context_kinds: BTreeSet::new(),
                counters: HashMap::new(),
            });
        for kind in event.context.kinds() {
            summary.context_kinds.insert(kind.to_owned());
        }
        let counter = summary
            .counters
            .entry(CounterKey {
                variation: event.variation,
                version: event.version,
            })
            .or_insert_with(|| Counter {
                value: event.value.clone(),
                count: 0,
            });
        counter.count += 1;
    }

    /// Serialize the summary event and clear all counters. Returns `None`
    /// when nothing was recorded.
    pub fn finish(&mut self, end_fallback: i64) -> Option<serde_json::Value> {
        if self.features.is_empty() {
            return None;
        }

        let mut features = serde_json::Map::new();
        for (flag_key, summary) in &self.features {
            let counters: Vec<serde_json::Value> = summary
                .counters
                .iter()
                .map(|(key, counter)| {
                    let mut object = json!({
                        "value": counter.value,
                        "count": counter.count,
                    });
                    let map = object.as_object_mut().expect("counter is an object");
                    if let Some(variation) = key.variation {
                        map.insert("variation".into(), json!(variation));
                    }
                    match key.version {
                        Some(version) => {
                            map.insert("version".into(), json!(version));
                        }
                        None => {
                            map.insert("unknown".into(), json!(true));
                        }
                    }
                    object
                })
                .collect();
            features.insert(
                flag_key.clone(),
                json!({
                    "default": summary.default_value,
                    "contextKinds": summary.context_kinds,
                    "counters": counters,
                }),
            );
        }

        let event = json!({
            "kind": "summary",
            "startDate": self.start_date.unwrap_or(end_fallback),
            "endDate": self.end_date.unwrap_or(end_fallback),
            "features": features,
        });

        self.features.clear();
        self.start_date = None;
        self.end_date = None;
        Some(event)
    }
}
