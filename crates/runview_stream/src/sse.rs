//! Incremental parser for the `text/event-stream` wire format.
//!
//! The transport hands us arbitrary byte chunks; a frame is only complete at
//! a blank line, so the parser buffers across chunk boundaries and yields
//! finished frames as they dispatch. Field handling covers the subset the run
//! endpoint emits: `event`, `data` (multi-line, joined with `\n`) and comment
//! lines; `id` and `retry` are accepted and ignored.

/// One dispatched server-sent event: a name and its joined data payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// Event name; `"message"` when the stream did not name one.
    pub event: String,
    /// Data lines joined with `\n`.
    pub data: String,
}

/// Stateful frame assembler fed with raw transport chunks.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one transport chunk and return every frame it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(line) = self.take_line() {
            if line.is_empty() {
                if let Some(frame) = self.dispatch() {
                    frames.push(frame);
                }
            } else {
                self.accept_line(&line);
            }
        }
        frames
    }

    /// Pop one complete line off the buffer. Bytes after the last newline
    /// stay buffered until a later chunk finishes the line, which also keeps
    /// multi-byte UTF-8 sequences intact across chunk boundaries.
    fn take_line(&mut self) -> Option<String> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line: Vec<u8> = self.buffer.drain(..=newline).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn accept_line(&mut self, line: &str) {
        if line.starts_with(':') {
            // Comment line, used by some servers as a keep-alive.
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, rest)) => (field, rest.strip_prefix(' ').unwrap_or(rest)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data_lines.push(value.to_string()),
            // `id` and `retry` are part of the grammar but unused here.
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take().unwrap_or_else(|| "message".to_string());
        if self.data_lines.is_empty() {
            // A blank line with no data buffered (e.g. after a comment)
            // dispatches nothing.
            return None;
        }
        let data = self.data_lines.join("\n");
        self.data_lines.clear();
        Some(SseFrame { event, data })
    }
}
