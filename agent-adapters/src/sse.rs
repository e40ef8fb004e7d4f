//! Incremental `text/event-stream` decoder.
//!
//! Bytes are fed in arbitrary chunks; complete events are returned as soon as
//! their terminating blank line has been seen. Lines may end in `\n`, `\r\n`
//! or a bare `\r`, and a chunk boundary may fall anywhere, including between
//! `\r` and `\n` or inside a multi-byte UTF-8 sequence.

use std::time::Duration;

use bytes::{Buf, BytesMut};

use crate::http_client::MAX_BODY_BYTES;
use crate::traits::{AdapterError, AdapterResult};

/// Event type assumed when an event carries no `event:` field.
pub const DEFAULT_EVENT_TYPE: &str = "message";

/// One dispatched server-sent event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SseEvent {
    event: String,
    data: String,
    id: Option<String>,
    retry: Option<Duration>,
}

impl SseEvent {
    /// Returns the event type (`message` unless the server named one).
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event
    }

    /// Returns the event payload (multiple `data:` lines joined with `\n`).
    #[must_use]
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Returns the last event id seen on the stream.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Returns the reconnection delay advertised by the server, if any.
    #[must_use]
    pub const fn retry(&self) -> Option<Duration> {
        self.retry
    }
}

/// Stateful decoder turning byte chunks into [`SseEvent`]s.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    skip_lf: bool,
    event_type: Option<String>,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseDecoder {
    /// Creates an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every event completed by it.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Protocol`] when an unterminated line or the
    /// pending event data grows past [`MAX_BODY_BYTES`].
    pub fn feed(&mut self, chunk: &[u8]) -> AdapterResult<Vec<SseEvent>> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        loop {
            if self.skip_lf {
                match self.buffer.first() {
                    None => break,
                    Some(b'\n') => {
                        self.buffer.advance(1);
                        self.skip_lf = false;
                    }
                    Some(_) => self.skip_lf = false,
                }
            }

            let Some(end) = self
                .buffer
                .iter()
                .position(|byte| matches!(byte, b'\n' | b'\r'))
            else {
                break;
            };

            let line = self.buffer.split_to(end);
            self.skip_lf = self.buffer[0] == b'\r';
            self.buffer.advance(1);

            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > MAX_BODY_BYTES || self.data.len() > MAX_BODY_BYTES {
            return Err(AdapterError::protocol(format!(
                "event stream event exceeds {MAX_BODY_BYTES} bytes"
            )));
        }
        Ok(events)
    }

    fn process_line(&mut self, line: &[u8]) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }

        let line = String::from_utf8_lossy(line);
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_owned()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_owned()),
            "retry" => {
                if let Ok(millis) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            _ => {}
        }

        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseEvent {
            event: event_type
                .filter(|kind| !kind.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_owned()),
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
            retry: self.retry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_endpoint_then_message() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b"event: endpoint\ndata: /messages/?session_id=abc\n\nevent: message\ndata: {\"id\":1}\n\n")
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type(), "endpoint");
        assert_eq!(events[0].data(), "/messages/?session_id=abc");
        assert_eq!(events[1].event_type(), "message");
        assert_eq!(events[1].data(), "{\"id\":1}");
    }

    #[test]
    fn joins_multiline_data_and_defaults_type() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data: first\ndata:second\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), DEFAULT_EVENT_TYPE);
        assert_eq!(events[0].data(), "first\nsecond");
    }

    #[test]
    fn handles_crlf_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: one\r").unwrap().is_empty());
        let events = decoder.feed(b"\n\r").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data(), "one");
        let events = decoder.feed(b"\ndata: two\r\n\r\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data(), "two");
    }

    #[test]
    fn bare_carriage_returns_terminate_lines() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"event: ping\rdata: x\r\r").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), "ping");
        assert_eq!(events[0].data(), "x");
    }

    #[test]
    fn utf8_split_inside_codepoint() {
        let payload = "data: héllo\n\n".as_bytes();
        let split = payload.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(&payload[..split]).unwrap().is_empty());
        let events = decoder.feed(&payload[split..]).unwrap();
        assert_eq!(events[0].data(), "héllo");
    }

    #[test]
    fn comments_and_empty_events_are_skipped() {
        let mut decoder = SseDecoder::new();
        let events = decoder
            .feed(b": keep-alive\n\nevent: lonely\n\ndata: real\n\n")
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type(), DEFAULT_EVENT_TYPE);
        assert_eq!(events[0].data(), "real");
    }

    #[test]
    fn tracks_id_and_retry() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"id: 7\nretry: 1500\ndata: a\n\ndata: b\n\n").unwrap();
        assert_eq!(events[0].id(), Some("7"));
        assert_eq!(events[0].retry(), Some(Duration::from_millis(1500)));
        assert_eq!(events[1].id(), Some("7"));
    }

    #[test]
    fn empty_data_line_still_dispatches() {
        let mut decoder = SseDecoder::new();
        let events = decoder.feed(b"data\n\n").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data(), "");
    }

    #[test]
    fn incomplete_event_is_held_back() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.feed(b"data: partial").unwrap().is_empty());
        let events = decoder.feed(b"\n\n").unwrap();
        assert_eq!(events[0].data(), "partial");
    }

    #[test]
    fn unterminated_line_is_capped() {
        let mut decoder = SseDecoder::new();
        let half = vec![b'x'; MAX_BODY_BYTES / 2 + 1];
        assert!(decoder.feed(b"data: ").unwrap().is_empty());
        assert!(decoder.feed(&half).unwrap().is_empty());
        let err = decoder.feed(&half).expect_err("no line terminator");
        assert!(matches!(err, AdapterError::Protocol { .. }));
    }

    #[test]
    fn undispatched_event_data_is_capped() {
        let mut decoder = SseDecoder::new();
        let mut line = b"data: ".to_vec();
        line.extend(vec![b'y'; 1024]);
        line.push(b'\n');
        let mut outcome = Ok(Vec::new());
        for _ in 0..=MAX_BODY_BYTES / 1024 {
            outcome = decoder.feed(&line);
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(outcome, Err(AdapterError::Protocol { .. })));
    }
}
