//! Newline-delimited JSON decoding for the service's streaming endpoints.
//!
//! The service writes one JSON object per line over a chunked body. Network
//! chunks split lines arbitrarily, so bytes are buffered in [`LineBuffer`]
//! until a newline arrives. [`GenerateDecoder`] applies the generation
//! protocol on top:
//!
//! - blank lines are skipped
//! - an optional `data:` prefix is stripped
//! - a non-JSON line is surfaced verbatim until the first JSON object has
//!   been seen, and skipped afterwards
//! - `{"error": ..}` ends the stream with that error
//! - a non-empty `"response"` is the next fragment
//! - `"done": true` ends the stream

use serde_json::Value;

/// Accumulates bytes and hands out complete lines.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every line completed by them (newline removed).
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
            line.pop();
            lines.push(line);
        }
        lines
    }

    /// The unterminated tail at end of stream, if any.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

/// Event produced by the generation protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Next piece of generated text
    Fragment(String),
    /// The service reported an error; nothing follows
    Error(String),
    /// The service signalled completion; nothing follows
    Done,
}

impl StreamEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error(_) | StreamEvent::Done)
    }
}

/// Stateful decoder for `/api/generate` streams.
#[derive(Debug, Default)]
pub struct GenerateDecoder {
    lines: LineBuffer,
    seen_json: bool,
    finished: bool,
}

impl GenerateDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a terminal event has been produced
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed a network chunk.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in self.lines.push(bytes) {
            if self.finished {
                break;
            }
            events.extend(self.decode_line(&line));
        }
        events
    }

    /// Flush the unterminated tail at end of stream.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        match self.lines.finish() {
            Some(line) if !self.finished => self.decode_line(&line),
            _ => Vec::new(),
        }
    }

    /// Decode one complete line.
    pub fn decode_line(&mut self, raw: &[u8]) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }

        let text = String::from_utf8_lossy(raw);
        let mut line = text.trim();
        if let Some(rest) = line.strip_prefix("data:") {
            line = rest.trim();
        }
        if line.is_empty() {
            return Vec::new();
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(_) if !self.seen_json => {
                return vec![StreamEvent::Fragment(line.to_string())];
            }
            Err(e) => {
                tracing::debug!("skipping undecodable stream line: {}", e);
                return Vec::new();
            }
        };
        self.seen_json = true;

        let Some(object) = value.as_object() else {
            return Vec::new();
        };

        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            self.finished = true;
            return vec![StreamEvent::Error(value_text(error))];
        }

        let mut events = Vec::new();
        if let Some(piece) = object.get("response").and_then(Value::as_str) {
            if !piece.is_empty() {
                events.push(StreamEvent::Fragment(piece.to_string()));
            }
        }
        if object.get("done").and_then(Value::as_bool) == Some(true) {
            self.finished = true;
            events.push(StreamEvent::Done);
        }
        events
    }
}

/// Outcome of draining a pull progress stream.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PullProgress {
    /// Last `"status"` reported
    pub last_status: Option<String>,
    /// First `"error"` reported
    pub error: Option<String>,
    /// Number of progress objects read
    pub objects: usize,
}

impl PullProgress {
    /// Record one progress line
    pub fn observe_line(&mut self, raw: &[u8]) {
        let text = String::from_utf8_lossy(raw);
        let mut line = text.trim();
        if let Some(rest) = line.strip_prefix("data:") {
            line = rest.trim();
        }
        if line.is_empty() {
            return;
        }

        let Ok(Value::Object(object)) = serde_json::from_str::<Value>(line) else {
            return;
        };
        self.objects += 1;

        if let Some(error) = object.get("error").filter(|e| !e.is_null()) {
            if self.error.is_none() {
                self.error = Some(value_text(error));
            }
        }
        if let Some(status) = object.get("status").and_then(Value::as_str) {
            self.last_status = Some(status.to_string());
        }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_lines(lines: &[&str]) -> Vec<StreamEvent> {
        let mut decoder = GenerateDecoder::new();
        let mut events = Vec::new();
        for line in lines {
            events.extend(decoder.decode_line(line.as_bytes()));
            if decoder.is_finished() {
                break;
            }
        }
        events
    }

    #[test]
    fn test_sse_prefix_blank_lines_and_done() {
        let events = decode_lines(&[
            "data: {\"response\":\"Hi\"}",
            "",
            "{\"response\":\" there\"}",
            "{\"done\":true}",
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("Hi".to_string()),
                StreamEvent::Fragment(" there".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_error_ends_stream_immediately() {
        let mut decoder = GenerateDecoder::new();
        let events = decoder.push(
            b"{\"response\":\"a\"}\n{\"error\":\"oom\"}\n{\"response\":\"never\"}\n",
        );
        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("a".to_string()),
                StreamEvent::Error("oom".to_string()),
            ]
        );
        assert!(decoder.is_finished());
        assert!(decoder.push(b"{\"response\":\"later\"}\n").is_empty());
    }

    #[test]
    fn test_noise_before_json_is_surfaced_then_skipped() {
        let events = decode_lines(&[
            "warming up",
            "{\"response\":\"x\"}",
            "garbage after json",
            "{\"response\":\"y\",\"done\":true}",
        ]);
        assert_eq!(
            events,
            vec![
                StreamEvent::Fragment("warming up".to_string()),
                StreamEvent::Fragment("x".to_string()),
                StreamEvent::Fragment("y".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[test]
    fn test_lines_split_across_chunks() {
        let mut decoder = GenerateDecoder::new();
        assert!(decoder.push(b"{\"respo").is_empty());
        assert_eq!(
            decoder.push(b"nse\":\"ab\"}\r\n{\"resp"),
            vec![StreamEvent::Fragment("ab".to_string())]
        );
        assert!(decoder.push(b"onse\":\"c\"}").is_empty());
        assert_eq!(
            decoder.finish(),
            vec![StreamEvent::Fragment("c".to_string())]
        );
    }

    #[test]
    fn test_empty_response_field_yields_nothing() {
        let events = decode_lines(&["{\"response\":\"\",\"done\":false}"]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_pull_progress_records_error_and_status() {
        let mut progress = PullProgress::default();
        let mut lines = LineBuffer::new();
        for line in lines.push(
            b"{\"status\":\"pulling manifest\"}\n{\"error\":\"file does not exist\"}\n{\"status\":\"x\"}\n",
        ) {
            progress.observe_line(&line);
        }
        assert_eq!(progress.objects, 3);
        assert_eq!(progress.error.as_deref(), Some("file does not exist"));
        assert_eq!(progress.last_status.as_deref(), Some("x"));
    }
}
