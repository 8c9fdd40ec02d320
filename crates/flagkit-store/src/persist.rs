// SPDX-License-Identifier: MIT OR Apache-2.0
//! The persistent-store plugin contract consumed by the lazy-load system.
//!
//! Implementations adapt an external store (Redis, DynamoDB, a file) to a
//! uniform serialized representation; the SDK owns deserialization and
//! caching. Reads are synchronous with respect to the calling evaluation.

use flagkit_core::DataKind;
use std::collections::HashMap;
use thiserror::Error;

/// A failure reported by a persistent store implementation.
#[derive(Debug, Error)]
#[error("persistent store error: {message}")]
pub struct PersistError {
    /// Human-readable description for logs.
    pub message: String,
}

impl PersistError {
    /// Wrap a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An item as stored externally: a version, a deleted marker, and the
/// serialized JSON (absent for tombstones).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SerializedItemDescriptor {
    /// Version of the item or its tombstone.
    pub version: u64,
    /// True when the entry is a tombstone.
    pub deleted: bool,
    /// The item's JSON, when present.
    pub serialized_item: Option<String>,
}

/// Read access to an external serialized data store.
pub trait SerializedDataReader: Send + Sync {
    /// Fetch one item by kind and key; `Ok(None)` when the store has no
    /// entry at all.
    fn get(
        &self,
        kind: DataKind,
        key: &str,
    ) -> Result<Option<SerializedItemDescriptor>, PersistError>;

    /// Fetch every item of a kind.
    fn all(&self, kind: DataKind) -> Result<HashMap<String, SerializedItemDescriptor>, PersistError>;

    /// True once the store has been populated by some writer.
    fn initialized(&self) -> bool;

    /// A short name for logs (e.g. `"redis at localhost:6379"`).
    fn identity(&self) -> String;
}
