// SPDX-License-Identifier: MIT OR Apache-2.0
//! Private-attribute redaction for event output.
//!
//! Contexts embedded in events (`index`, `identify`, `debug`) have their
//! private attributes removed and listed under `_meta.redactedAttributes`.
//! `key`, `kind`, and `anonymous` are never redacted.

use flagkit_core::{AttributeRef, Context, Value};
use serde_json::json;

/// Which attributes to strip from serialized contexts.
#[derive(Clone, Debug, Default)]
pub struct RedactionConfig {
    /// Redact every custom attribute.
    pub all_attributes_private: bool,
    /// Specific references to redact, in addition to any the context
    /// itself marks private.
    pub private_attributes: Vec<AttributeRef>,
}

impl RedactionConfig {
    /// Serialize a context with redaction applied.
    ///
    /// Single-kind contexts serialize flat (`{"kind": "user", ...}`);
    /// multi-kind contexts nest per kind under `{"kind": "multi"}`.
    pub fn redact(&self, context: &Context) -> serde_json::Value {
        let kinds: Vec<&str> = context.kinds().collect();
        if kinds.len() == 1 {
            let kind = kinds[0];
            let mut object = self.redact_kind(context, kind);
            object
                .as_object_mut()
                .expect("redacted context is an object")
                .insert("kind".into(), json!(kind));
            object
        } else {
            let mut map = serde_json::Map::new();
            map.insert("kind".into(), json!("multi"));
            for kind in kinds {
                map.insert(kind.to_owned(), self.redact_kind(context, kind));
            }
            serde_json::Value::Object(map)
        }
    }

    fn redact_kind(&self, context: &Context, kind: &str) -> serde_json::Value {
        let Some(attrs) = context.attributes_for(kind) else {
            return json!({});
        };

        let mut private: Vec<AttributeRef> = self.private_attributes.clone();
        private.extend(attrs.private_attributes().iter().cloned());

        let mut map = serde_json::Map::new();
        map.insert("key".into(), json!(attrs.key()));
        if attrs.anonymous() {
            map.insert("anonymous".into(), json!(true));
        }

        let mut redacted: Vec<String> = Vec::new();
        for (name, value) in attrs.attributes() {
            if self.all_attributes_private {
                redacted.push(name.clone());
                continue;
            }
            let top_level: Vec<&AttributeRef> = private
                .iter()
                .filter(|r| r.is_valid() && r.depth() == 1 && r.component(0) == Some(name))
                .collect();
            if !top_level.is_empty() {
                redacted.push(top_level[0].as_str().to_owned());
                continue;
            }
            let nested: Vec<&AttributeRef> = private
                .iter()
                .filter(|r| r.is_valid() && r.depth() > 1 && r.component(0) == Some(name))
                .collect();
            if nested.is_empty() {
                map.insert(name.clone(), json!(value));
            } else {
                let (kept, removed) = redact_nested(value, &nested);
                redacted.extend(removed);
                if let Some(kept) = kept {
                    map.insert(name.clone(), kept);
                }
            }
        }

        if !redacted.is_empty() {
            map.insert("_meta".into(), json!({ "redactedAttributes": redacted }));
        }
        serde_json::Value::Object(map)
    }
}

/// Remove the sub-paths named by `refs` (all sharing this value's
/// top-level component) from a nested value. Returns the surviving value
/// and the references that actually removed something.
fn redact_nested(value: &Value, refs: &[&AttributeRef]) -> (Option<serde_json::Value>, Vec<String>) {
    let mut kept = json!(value);
    let mut removed = Vec::new();
    for reference in refs {
        if remove_path(&mut kept, reference, 1) {
            removed.push(reference.as_str().to_owned());
        }
    }
    (Some(kept), removed)
}

fn remove_path(value: &mut serde_json::Value, reference: &AttributeRef, depth: usize) -> bool {
    let Some(component) = reference.component(depth) else {
        return false;
    };
    let Some(object) = value.as_object_mut() else {
        return false;
    };
    if depth == reference.depth() - 1 {
        object.remove(component).is_some()
    } else {
        match object.get_mut(component) {
            Some(next) => remove_path(next, reference, depth + 1),
            None => false,
        }
    }
}
