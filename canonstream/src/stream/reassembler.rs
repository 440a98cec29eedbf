// Copyright 2026 The Canonstream Project
// SPDX-License-Identifier: Apache-2.0

// Frame reassembler
//
// Turns arbitrarily split byte chunks into complete SSE events. Bytes are
// decoded incrementally so a multi-byte character split across chunks
// survives intact. A blank line ends an event; whatever follows stays
// buffered until the next chunk.

use super::types::LogicalEvent;

/// Per-stream SSE reassembly buffer.
///
/// Holds at most one partial line and one partial event at any time.
#[derive(Debug, Default)]
pub struct FrameReassembler {
    /// Undecoded tail bytes of an incomplete UTF-8 sequence.
    pending_bytes: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    line_buffer: String,
    /// Fields of the event being assembled.
    current: LogicalEvent,
}

impl FrameReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every event it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<LogicalEvent> {
        let text = self.decode(chunk);
        let mut buffer = std::mem::take(&mut self.line_buffer);
        // The buffered partial line holds no newline; only new text is scanned.
        let mut search_from = buffer.len();
        buffer.push_str(&text);

        let mut events = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = buffer[search_from..].find('\n') {
            let line_end = search_from + offset;
            let line = &buffer[line_start..line_end];
            let line = line.strip_suffix('\r').unwrap_or(line);

            if line.is_empty() {
                if let Some(event) = self.take_event() {
                    events.push(event);
                }
            } else {
                self.apply_line(line);
            }

            line_start = line_end + 1;
            search_from = line_start;
        }

        buffer.drain(..line_start);
        self.line_buffer = buffer;
        events
    }

    /// Drain the buffer at end of stream.
    ///
    /// Upstreams do not always terminate the last event with a blank line,
    /// so any residue is returned as one final event.
    pub fn flush(&mut self) -> Option<LogicalEvent> {
        if !self.pending_bytes.is_empty() {
            let tail = std::mem::take(&mut self.pending_bytes);
            self.line_buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let line = std::mem::take(&mut self.line_buffer);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        if !line.is_empty() {
            self.apply_line(line);
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<LogicalEvent> {
        let event = std::mem::take(&mut self.current);
        if event.is_empty() {
            None
        } else {
            Some(event)
        }
    }

    fn apply_line(&mut self, line: &str) {
        // Comment
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(pos) => {
                let value = &line[pos + 1..];
                (&line[..pos], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };

        match field {
            "data" => self.current.data.push(value.to_string()),
            "event" => self.current.event = Some(value.to_string()),
            "id" => self.current.id = Some(value.to_string()),
            "retry" => self.current.retry = value.trim().parse().ok(),
            _ => {}
        }
    }

    /// Decode as much of `chunk` as forms complete UTF-8, keeping an
    /// incomplete trailing sequence for the next call.
    fn decode(&mut self, chunk: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.pending_bytes);
        bytes.extend_from_slice(chunk);

        let mut out = String::with_capacity(bytes.len());
        let mut rest: &[u8] = &bytes;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    // Safe: `valid_up_to` marks a UTF-8 boundary.
                    out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[bad..];
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending_bytes = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&[u8]]) -> Vec<LogicalEvent> {
        let mut reassembler = FrameReassembler::new();
        let mut events = Vec::new();
        for chunk in chunks {
            events.extend(reassembler.feed(chunk));
        }
        events.extend(reassembler.flush());
        events
    }

    #[test]
    fn single_event_in_one_chunk() {
        let events = feed_all(&[b"data: {\"response\":\"hi\"}\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload(), "{\"response\":\"hi\"}");
    }

    #[test]
    fn event_split_across_chunks() {
        let events = feed_all(&[b"data: {\"response\":\"Hel", b"lo\"}\n", b"\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload(), "{\"response\":\"Hello\"}");
    }

    #[test]
    fn byte_at_a_time_matches_whole_stream() {
        let stream = "event: content_block_delta\r\ndata: {\"text\":\"h\u{e9}llo \u{1f600}\"}\r\n\r\n\
                      : keepalive\n\
                      id: 7\nretry: 1500\ndata: {\"a\":\n\
                      data: 1}\n\n\
                      data: [DONE]\n\n";
        let whole = feed_all(&[stream.as_bytes()]);

        let bytes = stream.as_bytes();
        let singles: Vec<&[u8]> = bytes.chunks(1).collect();
        let split = feed_all(&singles);

        assert_eq!(whole, split);
        assert_eq!(whole.len(), 3);
        assert_eq!(whole[0].event.as_deref(), Some("content_block_delta"));
        assert_eq!(whole[0].payload(), "{\"text\":\"h\u{e9}llo \u{1f600}\"}");
        assert_eq!(whole[1].id.as_deref(), Some("7"));
        assert_eq!(whole[1].retry, Some(1500));
        assert_eq!(whole[1].data.len(), 2);
        assert!(whole[2].is_done());
    }

    #[test]
    fn multibyte_character_split_mid_sequence() {
        let text = "data: {\"response\":\"\u{4f60}\u{597d}\"}\n\n";
        let bytes = text.as_bytes();
        // Cut inside the first three-byte character.
        let cut = bytes.iter().position(|b| *b >= 0x80).unwrap() + 1;
        let events = feed_all(&[&bytes[..cut], &bytes[cut..]]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload(), "{\"response\":\"\u{4f60}\u{597d}\"}");
    }

    #[test]
    fn unterminated_final_event_is_flushed() {
        let events = feed_all(&[b"data: {\"response\":\"a\"}\n\ndata: {\"response\":\"b\"}"]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].payload(), "{\"response\":\"b\"}");
    }

    #[test]
    fn metadata_lines_stay_inside_their_event() {
        let events = feed_all(&[b"event: ping\nid: 1\n\nevent: message\ndata: x\n\n"]);
        assert_eq!(events.len(), 2);
        assert!(events[0].data.is_empty());
        assert_eq!(events[1].event.as_deref(), Some("message"));
        assert_eq!(events[1].payload(), "x");
    }

    #[test]
    fn consecutive_blank_lines_yield_nothing() {
        let events = feed_all(&[b"\n\n\n\ndata: x\n\n\n"]);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let events = feed_all(&[b"data: a\xffb\n\n"]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload(), "a\u{fffd}b");
    }

    #[test]
    fn data_without_space_after_colon() {
        let events = feed_all(&[b"data:{\"x\":1}\n\n"]);
        assert_eq!(events[0].payload(), "{\"x\":1}");
    }

    #[test]
    fn empty_input_flushes_nothing() {
        assert!(feed_all(&[]).is_empty());
        assert!(feed_all(&[b"", b"\n"]).is_empty());
    }

    #[test]
    fn long_line_in_small_chunks() {
        let text = "x".repeat(200_000);
        let body = format!("data: {{\"response\":\"{text}\"}}\n\n");
        let mut r = FrameReassembler::new();
        let mut events = Vec::new();
        for chunk in body.as_bytes().chunks(16) {
            events.extend(r.feed(chunk));
            if events.is_empty() {
                assert!(!r.line_buffer.contains('\n'));
            }
        }
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload().len(), text.len() + r#"{"response":""}"#.len());
    }

    #[test]
    fn many_lines_in_one_chunk_keep_the_partial_tail() {
        let mut r = FrameReassembler::new();
        let events = r.feed(b"data: a\n\ndata: b\r\n\r\ndata: c\n\ndata: par");
        let payloads: Vec<String> = events.iter().map(|e| e.payload()).collect();
        assert_eq!(payloads, vec!["a", "b", "c"]);
        assert_eq!(r.line_buffer, "data: par");

        let events = r.feed(b"tial\n\n");
        assert_eq!(events[0].payload(), "partial");
    }
}
