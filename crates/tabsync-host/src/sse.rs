//! Incremental decoder for `text/event-stream` bodies.

use tracing::warn;

/// Event name used when a frame has no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Longest line kept. Longer lines are discarded up to their newline.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Most data one frame may accumulate. Larger frames are dropped whole.
pub const MAX_DATA_BYTES: usize = 1024 * 1024;

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Feeds on raw body chunks, yields complete frames.
///
/// Lines end in LF or CRLF and may be split across chunks anywhere,
/// including inside a multi-byte character.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Bytes of `buffer` already known to hold no newline.
    scanned: usize,
    skipping_line: bool,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    oversized: bool,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        let mut line_start = 0;
        while let Some(offset) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let line_end = self.scanned + offset;
            self.scanned = line_end + 1;

            let skip = std::mem::take(&mut self.skipping_line)
                || line_end - line_start > MAX_LINE_BYTES;
            if !skip {
                let raw = &self.buffer[line_start..line_end];
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                let line = String::from_utf8_lossy(raw).into_owned();
                if let Some(frame) = self.process_line(&line) {
                    frames.push(frame);
                }
            } else {
                warn!(limit = MAX_LINE_BYTES, "Discarding overlong event stream line");
            }
            line_start = self.scanned;
        }

        self.buffer.drain(..line_start);
        self.scanned = self.buffer.len();
        if self.buffer.len() > MAX_LINE_BYTES {
            self.buffer.clear();
            self.scanned = 0;
            self.skipping_line = true;
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" if self.data_len + value.len() > MAX_DATA_BYTES => self.oversized = true,
            "data" => {
                self.data_len += value.len();
                self.data.push(value.to_string());
            }
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {}
        }
        None
    }

    /// A frame is dispatched once it has a name or at least one data line.
    fn dispatch(&mut self) -> Option<SseFrame> {
        self.data_len = 0;
        if std::mem::take(&mut self.oversized) {
            warn!(limit = MAX_DATA_BYTES, event = ?self.event, "Dropping oversized event");
            self.event = None;
            self.data.clear();
            return None;
        }
        if self.event.is_none() && self.data.is_empty() {
            return None;
        }
        let event = self
            .event
            .take()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| DEFAULT_EVENT.to_string());
        let data = std::mem::take(&mut self.data).join("\n");
        Some(SseFrame {
            event,
            data,
            id: self.id.clone(),
        })
    }
}
