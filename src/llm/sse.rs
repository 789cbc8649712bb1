//! Incremental Server-Sent Events decoding for streamed generation responses.
//!
//! Only the `data:` field matters to the generation API; `event:`/`id:`
//! fields and comment lines are ignored. Bytes are buffered until a full
//! line is available, so UTF-8 sequences split across network chunks are
//! decoded intact.
//!
//! # Examples
//!
//! ```
//! use nova::llm::sse::SseDecoder;
//!
//! let mut decoder = SseDecoder::new();
//! let mut payloads = decoder.push(b"data: {\"a\":1}\n\ndata: [DO");
//! payloads.extend(decoder.push(b"NE]\n\n"));
//! assert_eq!(payloads, vec!["{\"a\":1}".to_owned(), "[DONE]".to_owned()]);
//! ```

/// Whether a payload is the `[DONE]` sentinel some providers send last.
pub fn is_done(payload: &str) -> bool {
    payload.trim() == "[DONE]"
}

/// Incremental SSE decoder yielding one string per complete event.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    data_lines: Vec<String>,
}

impl SseDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes, returning the data payloads of every event
    /// completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(payload) = self.process_line(line) {
                events.push(payload);
            }
        }

        events
    }

    /// Flush an event left without its terminating blank line.
    pub fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let raw = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&raw).into_owned();
            let line = line.strip_suffix('\r').unwrap_or(&line).to_owned();
            // A trailing partial line can itself complete an event.
            if let Some(payload) = self.process_line(&line) {
                return Some(payload);
            }
        }
        self.take_event()
    }

    fn process_line(&mut self, line: &str) -> Option<String> {
        if line.is_empty() {
            return self.take_event();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_owned());
        }
        None
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_event() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: hello\n\n");
        assert_eq!(events, vec!["hello"]);
    }

    #[test]
    fn event_split_across_chunks() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"da").is_empty());
        assert!(decoder.push(b"ta: hel").is_empty());
        assert!(decoder.push(b"lo\n").is_empty());
        assert_eq!(decoder.push(b"\n"), vec!["hello"]);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let text = "data: caf\u{e9}\n\n".as_bytes();
        // Split inside the two-byte encoding of 'é'.
        let split = text.len() - 3;
        let mut decoder = SseDecoder::new();
        let mut events = decoder.push(&text[..split]);
        events.extend(decoder.push(&text[split..]));
        assert_eq!(events, vec!["caf\u{e9}"]);
    }

    #[test]
    fn multi_line_data_joined_with_newline() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: line1\ndata: line2\n\n");
        assert_eq!(events, vec!["line1\nline2"]);
    }

    #[test]
    fn crlf_line_endings() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b"data: a\r\n\r\ndata: b\r\n\r\n");
        assert_eq!(events, vec!["a", "b"]);
    }

    #[test]
    fn comments_and_other_fields_ignored() {
        let mut decoder = SseDecoder::new();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata: x\n\n");
        assert_eq!(events, vec!["x"]);
    }

    #[test]
    fn blank_lines_without_data_emit_nothing() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"\n\n\n").is_empty());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("tail"));
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn done_sentinel() {
        assert!(is_done("[DONE]"));
        assert!(is_done(" [DONE] "));
        assert!(!is_done("{}"));
    }
}
