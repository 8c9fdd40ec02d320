// SPDX-License-Identifier: MIT OR Apache-2.0
//! The streaming wire protocol: `put`, `patch`, and `delete` messages.

use crate::status::{DataSourceState, DataSourceStatusManager, ErrorKind};
use flagkit_core::{
    DataKind, DataSet, Flag, FlagDescriptor, Segment, SegmentDescriptor,
};
use flagkit_store::Destination;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error};

const ERROR_PARSING_PUT: &str = "could not parse PUT message";
const ERROR_PARSING_PATCH: &str = "could not parse PATCH message";
const ERROR_PARSING_DELETE: &str = "could not parse DELETE message";

/// Outcome of handling one stream message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageStatus {
    /// Applied (or deliberately ignored for forward compatibility).
    Handled,
    /// Dropped because it failed to parse; the stream stays up.
    InvalidMessage,
    /// An event type this SDK does not know.
    UnhandledVerb,
}

/// Split `/flags/<key>` or `/segments/<key>` into kind and key. Anything
/// else is unrecognized and ignored for forward compatibility.
fn parse_path(path: &str) -> Option<(DataKind, &str)> {
    if let Some(key) = path.strip_prefix("/flags/") {
        (!key.is_empty()).then_some((DataKind::Flag, key))
    } else if let Some(key) = path.strip_prefix("/segments/") {
        (!key.is_empty()).then_some((DataKind::Segment, key))
    } else {
        None
    }
}

#[derive(Deserialize)]
struct PutMessage {
    #[serde(default)]
    path: Option<String>,
    data: DataSet,
}

#[derive(Deserialize)]
struct PatchMessage {
    path: String,
    data: serde_json::Value,
}

#[derive(Deserialize)]
struct DeleteMessage {
    path: String,
    version: u64,
}

/// Applies parsed stream messages to a destination, surfacing schema
/// failures through the status manager.
pub struct StreamEventHandler {
    destination: Arc<dyn Destination>,
    status: Arc<DataSourceStatusManager>,
}

impl StreamEventHandler {
    /// Create a handler writing into `destination`.
    pub fn new(destination: Arc<dyn Destination>, status: Arc<DataSourceStatusManager>) -> Self {
        Self {
            destination,
            status,
        }
    }

    /// Dispatch one SSE event by type and payload.
    pub fn handle_message(&self, event_type: &str, data: &str) -> MessageStatus {
        match event_type {
            "put" => self.handle_put(data),
            "patch" => self.handle_patch(data),
            "delete" => self.handle_delete(data),
            other => {
                debug!(event_type = other, "ignoring unrecognized stream event");
                MessageStatus::UnhandledVerb
            }
        }
    }

    fn handle_put(&self, data: &str) -> MessageStatus {
        let put: PutMessage = match serde_json::from_str(data) {
            Ok(put) => put,
            Err(err) => return self.invalid(ERROR_PARSING_PUT, &err),
        };
        // A put for any path other than the root is not ours to apply.
        if let Some(path) = put.path.as_deref() {
            if !(path.is_empty() || path == "/") {
                return MessageStatus::Handled;
            }
        }
        self.destination.init(put.data);
        self.status.set_state(DataSourceState::Valid);
        MessageStatus::Handled
    }

    fn handle_patch(&self, data: &str) -> MessageStatus {
        let patch: PatchMessage = match serde_json::from_str(data) {
            Ok(patch) => patch,
            Err(err) => return self.invalid(ERROR_PARSING_PATCH, &err),
        };
        let Some((kind, key)) = parse_path(&patch.path) else {
            // Unrecognized path prefix: ignore for forward compatibility.
            return MessageStatus::Handled;
        };
        match kind {
            DataKind::Flag => match serde_json::from_value::<Flag>(patch.data) {
                Ok(flag) => {
                    self.destination.upsert_flag(key, FlagDescriptor::new(flag));
                    MessageStatus::Handled
                }
                Err(err) => self.invalid(ERROR_PARSING_PATCH, &err),
            },
            DataKind::Segment => match serde_json::from_value::<Segment>(patch.data) {
                Ok(segment) => {
                    self.destination
                        .upsert_segment(key, SegmentDescriptor::new(segment));
                    MessageStatus::Handled
                }
                Err(err) => self.invalid(ERROR_PARSING_PATCH, &err),
            },
        }
    }

    fn handle_delete(&self, data: &str) -> MessageStatus {
        let delete: DeleteMessage = match serde_json::from_str(data) {
            Ok(delete) => delete,
            Err(err) => return self.invalid(ERROR_PARSING_DELETE, &err),
        };
        let Some((kind, key)) = parse_path(&delete.path) else {
            return MessageStatus::Handled;
        };
        match kind {
            DataKind::Flag => self
                .destination
                .upsert_flag(key, FlagDescriptor::tombstone(delete.version)),
            DataKind::Segment => self
                .destination
                .upsert_segment(key, SegmentDescriptor::tombstone(delete.version)),
        }
        MessageStatus::Handled
    }

    fn invalid(&self, what: &str, err: &dyn std::fmt::Display) -> MessageStatus {
        error!("{what}: {err}");
        self.status.set_error(ErrorKind::InvalidData, what);
        MessageStatus::InvalidMessage
    }
}
