// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation contexts: the subject of every flag evaluation.
//!
//! A context is one or more *kinds* (`"user"`, `"org"`, ...), each with a
//! key and an attribute tree. Contexts are immutable once built; the
//! builder validates kinds and keys but still produces a [`Context`] on
//! failure so that an invalid context can flow through an evaluation and
//! surface as an error reason rather than a panic.

use crate::attributes::AttributeRef;
use crate::value::Value;
use std::collections::BTreeMap;

/// Attributes for a single kind within a [`Context`].
#[derive(Clone, Debug, PartialEq)]
pub struct KindAttributes {
    key: String,
    anonymous: bool,
    attributes: BTreeMap<String, Value>,
    private_attributes: Vec<AttributeRef>,
}

impl KindAttributes {
    /// The context key for this kind.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this kind is marked anonymous.
    pub fn anonymous(&self) -> bool {
        self.anonymous
    }

    /// The custom attribute map.
    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Attribute references the caller asked to keep private.
    pub fn private_attributes(&self) -> &[AttributeRef] {
        &self.private_attributes
    }
}

/// The subject of an evaluation: a set of kinds, each with a key and
/// attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Context {
    kinds: BTreeMap<String, KindAttributes>,
    canonical_key: String,
    error: Option<String>,
}

impl Context {
    /// Start building a single- or multi-kind context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::new()
    }

    /// Whether the context passed validation.
    pub fn is_valid(&self) -> bool {
        self.error.is_none()
    }

    /// The validation error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// The kind names present in this context, in sorted order.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// True if the given kind is present.
    pub fn has_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// The key for the given kind, if present.
    pub fn key_for(&self, kind: &str) -> Option<&str> {
        self.kinds.get(kind).map(|a| a.key())
    }

    /// The attributes for the given kind, if present.
    pub fn attributes_for(&self, kind: &str) -> Option<&KindAttributes> {
        self.kinds.get(kind)
    }

    /// True if this is a single-kind `user` context.
    pub fn is_user(&self) -> bool {
        self.kinds.len() == 1 && self.kinds.contains_key("user")
    }

    /// Look up an attribute value by reference within the given kind.
    ///
    /// `"kind"` resolves to the kind name, `"key"` to the key, and
    /// `"anonymous"` to the anonymous marker; anything else walks the
    /// attribute tree. Returns [`Value::Null`] when the kind or the
    /// attribute is absent, or when the reference is invalid.
    pub fn get(&self, kind: &str, reference: &AttributeRef) -> Value {
        if !reference.is_valid() {
            return Value::Null;
        }
        let Some(attrs) = self.kinds.get(kind) else {
            return Value::Null;
        };
        if reference.depth() == 1 {
            match reference.component(0) {
                Some("kind") => return Value::from(kind),
                Some("key") => return Value::from(attrs.key.as_str()),
                Some("anonymous") => return Value::from(attrs.anonymous),
                _ => {}
            }
        }
        let mut current = match reference.component(0).and_then(|c| attrs.attributes.get(c)) {
            Some(v) => v,
            None => return Value::Null,
        };
        for i in 1..reference.depth() {
            let Some(component) = reference.component(i) else {
                return Value::Null;
            };
            match current {
                Value::Object(map) => match map.get(component) {
                    Some(next) => current = next,
                    None => return Value::Null,
                },
                _ => return Value::Null,
            }
        }
        current.clone()
    }

    /// A stable string combining every `(kind, key)` pair.
    ///
    /// A single-kind `user` context canonicalizes to its bare key; anything
    /// else joins `kind:key` pairs in kind order, with `%` and `:` in keys
    /// percent-escaped.
    pub fn canonical_key(&self) -> &str {
        &self.canonical_key
    }
}

fn canonicalize(kinds: &BTreeMap<String, KindAttributes>) -> String {
    if kinds.len() == 1 {
        if let Some(user) = kinds.get("user") {
            return user.key.clone();
        }
    }
    kinds
        .iter()
        .map(|(kind, attrs)| {
            let escaped = attrs.key.replace('%', "%25").replace(':', "%3A");
            format!("{kind}:{escaped}")
        })
        .collect::<Vec<_>>()
        .join(":")
}

fn valid_kind(kind: &str) -> bool {
    !kind.is_empty()
        && kind != "kind"
        && kind != "multi"
        && kind
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

/// Builder for [`Context`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    kinds: BTreeMap<String, KindAttributes>,
    current: Option<String>,
    error: Option<String>,
}

impl ContextBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a kind with its key and make it current for subsequent `set`
    /// calls. Repeating a kind replaces its previous entry.
    pub fn kind(mut self, kind: impl Into<String>, key: impl Into<String>) -> Self {
        let kind = kind.into();
        let key = key.into();
        if !valid_kind(&kind) {
            self.error.get_or_insert(format!("invalid context kind {kind:?}"));
        }
        if key.is_empty() {
            self.error
                .get_or_insert(format!("context key for kind {kind:?} must not be empty"));
        }
        self.kinds.insert(
            kind.clone(),
            KindAttributes {
                key,
                anonymous: false,
                attributes: BTreeMap::new(),
                private_attributes: Vec::new(),
            },
        );
        self.current = Some(kind);
        self
    }

    /// Set an attribute on the current kind.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        match self.current.as_ref().and_then(|k| self.kinds.get_mut(k)) {
            Some(attrs) => {
                attrs.attributes.insert(name.into(), value.into());
            }
            None => {
                self.error
                    .get_or_insert("set() called before any kind() was added".to_owned());
            }
        }
        self
    }

    /// Mark the current kind anonymous.
    pub fn anonymous(mut self, anonymous: bool) -> Self {
        if let Some(attrs) = self.current.as_ref().and_then(|k| self.kinds.get_mut(k)) {
            attrs.anonymous = anonymous;
        }
        self
    }

    /// Mark an attribute of the current kind private for event redaction.
    pub fn private_attribute(mut self, reference: impl Into<AttributeRef>) -> Self {
        if let Some(attrs) = self.current.as_ref().and_then(|k| self.kinds.get_mut(k)) {
            attrs.private_attributes.push(reference.into());
        }
        self
    }

    /// Finish building. An invalid specification still yields a context,
    /// with [`Context::is_valid`] false.
    pub fn build(mut self) -> Context {
        if self.kinds.is_empty() {
            self.error
                .get_or_insert("context must contain at least one kind".to_owned());
        }
        let canonical_key = canonicalize(&self.kinds);
        Context {
            kinds: self.kinds,
            canonical_key,
            error: self.error,
        }
    }
}
