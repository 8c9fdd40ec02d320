// SPDX-License-Identifier: MIT OR Apache-2.0
//! Attribute references: paths addressing a value inside a context.
//!
//! A reference is either a plain attribute name (`"email"`) or a
//! slash-prefixed pointer (`"/address/city"`) whose components may escape
//! literal `/` as `~1` and literal `~` as `~0`. Malformed references are
//! representable and report `!is_valid()` so that callers can fail a clause
//! or a rollout instead of panicking.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A parsed reference to a context attribute.
#[derive(Clone, Debug, Eq)]
pub struct AttributeRef {
    raw: String,
    components: Vec<String>,
    valid: bool,
}

impl AttributeRef {
    /// Parse a reference from its string form.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.is_empty() || raw == "/" {
            return Self::invalid(raw);
        }
        if let Some(rest) = raw.strip_prefix('/') {
            let mut components = Vec::new();
            for part in rest.split('/') {
                match unescape(part) {
                    Some(c) if !c.is_empty() => components.push(c),
                    _ => return Self::invalid(raw),
                }
            }
            Self {
                raw,
                components,
                valid: true,
            }
        } else {
            // A plain name is a single component, taken literally (a `~` in a
            // plain name is not an escape).
            let components = vec![raw.clone()];
            Self {
                raw,
                components,
                valid: true,
            }
        }
    }

    fn invalid(raw: String) -> Self {
        Self {
            raw,
            components: Vec::new(),
            valid: false,
        }
    }

    /// Whether the reference parsed successfully.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Whether this reference addresses the special `kind` meta-attribute.
    pub fn is_kind(&self) -> bool {
        self.valid && self.components.len() == 1 && self.components[0] == "kind"
    }

    /// Number of path components (zero for an invalid reference).
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The component at `index`, if present.
    pub fn component(&self, index: usize) -> Option<&str> {
        self.components.get(index).map(String::as_str)
    }

    /// The original string form.
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

fn unescape(part: &str) -> Option<String> {
    if !part.contains('~') {
        return Some(part.to_owned());
    }
    let mut out = String::with_capacity(part.len());
    let mut chars = part.chars();
    while let Some(c) = chars.next() {
        if c != '~' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('0') => out.push('~'),
            Some('1') => out.push('/'),
            _ => return None,
        }
    }
    Some(out)
}

impl PartialEq for AttributeRef {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl fmt::Display for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for AttributeRef {
    fn from(s: &str) -> Self {
        AttributeRef::new(s)
    }
}

impl Serialize for AttributeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for AttributeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(AttributeRef::new(raw))
    }
}

impl Default for AttributeRef {
    fn default() -> Self {
        Self::invalid(String::new())
    }
}
