// SPDX-License-Identifier: MIT OR Apache-2.0
//! The bounded buffer between event production and flushes.

use serde_json::Value;
use std::collections::VecDeque;

/// A fixed-capacity queue of serialized output events. Overflow drops the
/// newest events; the caller is told so it can warn exactly once per
/// congestion episode.
#[derive(Debug)]
pub struct Outbox {
    items: VecDeque<Value>,
    capacity: usize,
}

impl Outbox {
    /// An outbox holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append events, discarding any beyond capacity. Returns true when
    /// at least one event was dropped.
    pub fn push_discard_overflow(&mut self, events: Vec<Value>) -> bool {
        let mut dropped = false;
        for event in events {
            if self.items.len() >= self.capacity {
                dropped = true;
            } else {
                self.items.push_back(event);
            }
        }
        dropped
    }

    /// Take everything, leaving the outbox empty.
    pub fn drain(&mut self) -> Vec<Value> {
        self.items.drain(..).collect()
    }

    /// True when no events are waiting.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of waiting events.
    pub fn len(&self) -> usize {
        self.items.len()
    }
}
