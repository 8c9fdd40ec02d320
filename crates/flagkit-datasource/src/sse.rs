// SPDX-License-Identifier: MIT OR Apache-2.0
//! A minimal server-sent-events decoder.
//!
//! Feed raw body chunks in; complete events come out. Implements the
//! subset of the SSE grammar the flag delivery service uses: `event:` and
//! `data:` fields (multi-line data joined with `\n`), comment lines, and
//! blank-line dispatch. `id:` and `retry:` fields are tolerated and
//! ignored.

/// One decoded server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    /// The event type; `"message"` when the stream did not name one.
    pub event_type: String,
    /// The event payload.
    pub data: String,
}

/// Incremental SSE decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// A decoder with empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume a chunk of the response body, returning any events it
    /// completed.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();
        while let Some(newline) = self.buffer.find('\n') {
            let mut line: String = self.buffer.drain(..=newline).collect();
            if line.ends_with('\n') {
                line.pop();
            }
            if line.ends_with('\r') {
                line.pop();
            }
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            // Comment; servers use these as heartbeats.
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event_type = Some(value.to_owned()),
            "data" => self.data_lines.push(value.to_owned()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.event_type.is_none() && self.data_lines.is_empty() {
            return None;
        }
        let event = SseEvent {
            event_type: self
                .event_type
                .take()
                .unwrap_or_else(|| "message".to_owned()),
            data: self.data_lines.join("\n"),
        };
        self.data_lines.clear();
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_simple_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("event: put\ndata: {\"x\":1}\n\n");
        assert_eq!(
            events,
            vec![SseEvent {
                event_type: "put".into(),
                data: "{\"x\":1}".into()
            }]
        );
    }

    #[test]
    fn joins_multi_line_data() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("data: line1\ndata: line2\n\n");
        assert_eq!(events[0].data, "line1\nline2");
        assert_eq!(events[0].event_type, "message");
    }

    #[test]
    fn handles_chunks_split_mid_line() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed("event: pa").is_empty());
        assert!(decoder.feed("tch\ndata: {}").is_empty());
        let events = decoder.feed("\n\n");
        assert_eq!(events[0].event_type, "patch");
        assert_eq!(events[0].data, "{}");
    }

    #[test]
    fn ignores_comments_and_unknown_fields() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(":heartbeat\nid: 7\nretry: 100\n\n");
        assert!(events.is_empty());
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("event: put\r\ndata: 1\r\n\r\n");
        assert_eq!(events[0].event_type, "put");
        assert_eq!(events[0].data, "1");
    }

    #[test]
    fn consecutive_events_are_separated() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed("data: a\n\ndata: b\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].data, "a");
        assert_eq!(events[1].data, "b");
    }
}
