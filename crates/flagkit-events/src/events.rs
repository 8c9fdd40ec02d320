// SPDX-License-Identifier: MIT OR Apache-2.0
//! Input events produced by the client and their wire representation.

use crate::redaction::RedactionConfig;
use chrono::Utc;
use flagkit_core::{Context, EvaluationReason, Value};
use serde_json::json;

/// Milliseconds since the Unix epoch, the timestamp unit of every event.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// An evaluation to be recorded (summarized always; sent in full when the
/// flag tracks events or is in its debug window).
#[derive(Clone, Debug)]
pub struct EvalEvent {
    /// When the evaluation happened.
    pub creation_date: i64,
    /// The evaluated flag's key.
    pub flag_key: String,
    /// The flag's version; `None` when the flag was unknown.
    pub version: Option<u64>,
    /// The evaluated context.
    pub context: Context,
    /// The selected variation index, if one was selected.
    pub variation: Option<usize>,
    /// The served value.
    pub value: Value,
    /// The host-supplied default.
    pub default_value: Value,
    /// The evaluation reason, when the caller asked for reasons or the
    /// flag requires them.
    pub reason: Option<EvaluationReason>,
    /// Set when this evaluation happened as a prerequisite of another
    /// flag.
    pub prereq_of: Option<String>,
    /// Emit a full `feature` event, not just a summary count.
    pub track_events: bool,
    /// Emit `debug` events until this time (milliseconds since epoch).
    pub debug_events_until_date: Option<u64>,
}

/// A context self-identification.
#[derive(Clone, Debug)]
pub struct IdentifyEvent {
    /// When the identify happened.
    pub creation_date: i64,
    /// The identified context.
    pub context: Context,
}

/// A custom metric event from `track`.
#[derive(Clone, Debug)]
pub struct CustomEvent {
    /// When the track call happened.
    pub creation_date: i64,
    /// The metric key.
    pub key: String,
    /// The associated context.
    pub context: Context,
    /// Arbitrary payload.
    pub data: Option<Value>,
    /// Numeric metric value for experimentation.
    pub metric_value: Option<f64>,
}

/// Everything the host can feed into the pipeline.
#[derive(Clone, Debug)]
pub enum InputEvent {
    /// A flag evaluation.
    Eval(EvalEvent),
    /// An identify call.
    Identify(IdentifyEvent),
    /// A track call.
    Custom(CustomEvent),
}

fn context_keys(context: &Context) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for kind in context.kinds() {
        if let Some(key) = context.key_for(kind) {
            map.insert(kind.to_owned(), json!(key));
        }
    }
    serde_json::Value::Object(map)
}

/// Wire form of a full `feature` event.
pub fn feature_event(event: &EvalEvent) -> serde_json::Value {
    let mut object = json!({
        "kind": "feature",
        "creationDate": event.creation_date,
        "key": event.flag_key,
        "contextKeys": context_keys(&event.context),
        "value": event.value,
        "default": event.default_value,
    });
    let map = object.as_object_mut().expect("feature event is an object");
    if let Some(version) = event.version {
        map.insert("version".into(), json!(version));
    }
    if let Some(variation) = event.variation {
        map.insert("variation".into(), json!(variation));
    }
    if let Some(reason) = &event.reason {
        map.insert("reason".into(), json!(reason));
    }
    if let Some(prereq_of) = &event.prereq_of {
        map.insert("prereqOf".into(), json!(prereq_of));
    }
    object
}

/// Wire form of a `debug` event: a feature event carrying the full
/// redacted context inline.
pub fn debug_event(event: &EvalEvent, redaction: &RedactionConfig) -> serde_json::Value {
    let mut object = feature_event(event);
    let map = object.as_object_mut().expect("debug event is an object");
    map.insert("kind".into(), json!("debug"));
    map.remove("contextKeys");
    map.insert("context".into(), redaction.redact(&event.context));
    object
}

/// Wire form of an `index` event, announcing a context's full attributes
/// once per dedup window.
pub fn index_event(
    creation_date: i64,
    context: &Context,
    redaction: &RedactionConfig,
) -> serde_json::Value {
    json!({
        "kind": "index",
        "creationDate": creation_date,
        "context": redaction.redact(context),
    })
}

/// Wire form of an `identify` event.
pub fn identify_event(event: &IdentifyEvent, redaction: &RedactionConfig) -> serde_json::Value {
    json!({
        "kind": "identify",
        "creationDate": event.creation_date,
        "context": redaction.redact(&event.context),
    })
}

/// Wire form of a `custom` event.
pub fn custom_event(event: &CustomEvent) -> serde_json::Value {
    let mut object = json!({
        "kind": "custom",
        "creationDate": event.creation_date,
        "key": event.key,
        "contextKeys": context_keys(&event.context),
    });
    let map = object.as_object_mut().expect("custom event is an object");
    if let Some(data) = &event.data {
        map.insert("data".into(), json!(data));
    }
    if let Some(metric_value) = event.metric_value {
        map.insert("metricValue".into(), json!(metric_value));
    }
    object
}
