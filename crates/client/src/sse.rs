//! Incremental decoder for the `text/event-stream` format.
//!
//! [`SseDecoder`] is fed raw body chunks as they arrive and yields complete
//! [`SseEvent`]s. Partial lines, including UTF-8 sequences split across
//! chunks, stay buffered until their line terminator arrives. An event that
//! is still open when the stream ends is never dispatched. An unterminated
//! line longer than the configured limit is rejected with [`LineTooLong`].

use std::time::Duration;

use jobstream_core::job_events::EVENT_KIND_MESSAGE;

/// One dispatched event-stream event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type; `message` when the server sent no `event:` field.
    pub event: String,
    /// All `data:` lines of the event joined with `\n`.
    pub data: String,
    /// Last event id seen on the stream, if any.
    pub id: Option<String>,
}

impl SseEvent {
    /// A default-typed (`message`) event.
    pub fn message(data: impl Into<String>) -> Self {
        Self::named(EVENT_KIND_MESSAGE, data)
    }

    /// An event with an explicit `event:` type.
    pub fn named(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: data.into(),
            id: None,
        }
    }
}

/// Longest unterminated line the decoder will buffer, in bytes.
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024 * 1024;

/// The peer sent a line longer than the decoder accepts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Event-stream line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Stateful line decoder for one event stream.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    /// Offset into `buffer` up to which no line terminator was found.
    scanned: usize,
    max_line_length: usize,
    event_type: String,
    data: String,
    last_event_id: Option<String>,
    retry: Option<Duration>,
    seen_first_line: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            buffer: Vec::new(),
            scanned: 0,
            max_line_length,
            event_type: String::new(),
            data: String::new(),
            last_event_id: None,
            retry: None,
            seen_first_line: false,
        }
    }

    /// Reconnection delay most recently advertised via `retry:`.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Feed one body chunk and return every event it completes.
    ///
    /// Fails once an unterminated line grows past the configured limit;
    /// the stream should be abandoned at that point.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, LineTooLong> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some((end, next)) = self.find_line_end(start) {
            let line = self.take_line(start, end);
            start = next;
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        self.buffer.drain(..start);
        self.scanned -= start;

        if self.buffer.len() > self.max_line_length {
            self.buffer.clear();
            self.scanned = 0;
            return Err(LineTooLong {
                limit: self.max_line_length,
            });
        }
        Ok(events)
    }

    // ---- private helpers ----

    /// Locate the end of the line starting at `start`.
    ///
    /// Returns the terminator position and the start of the following
    /// line. Lines end in LF, CRLF or a lone CR. A CR that is the last
    /// buffered byte is held back since the LF may arrive in the next
    /// chunk. Bytes already scanned by an earlier call are not rescanned.
    fn find_line_end(&mut self, start: usize) -> Option<(usize, usize)> {
        let from = self.scanned.max(start);
        let Some(offset) = self.buffer[from..]
            .iter()
            .position(|b| *b == b'\n' || *b == b'\r')
        else {
            self.scanned = self.buffer.len();
            return None;
        };

        let pos = from + offset;
        if self.buffer[pos] == b'\n' {
            return Some((pos, pos + 1));
        }
        match self.buffer.get(pos + 1) {
            Some(b'\n') => Some((pos, pos + 2)),
            Some(_) => Some((pos, pos + 1)),
            None => {
                self.scanned = pos;
                None
            }
        }
    }

    fn take_line(&mut self, start: usize, end: usize) -> String {
        let mut line = String::from_utf8_lossy(&self.buffer[start..end]).into_owned();
        if !self.seen_first_line {
            self.seen_first_line = true;
            if let Some(rest) = line.strip_prefix('\u{feff}') {
                line = rest.to_string();
            }
        }
        line
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
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
            "event" => self.event_type = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => {
                self.last_event_id = (!value.is_empty()).then(|| value.to_string());
            }
            "retry" if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            _ => {}
        }
        None
    }

    /// Blank line: emit the pending event, if it has data.
    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = std::mem::take(&mut self.event_type);
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseEvent {
            event: if event_type.is_empty() {
                EVENT_KIND_MESSAGE.to_string()
            } else {
                event_type
            },
            data,
            id: self.last_event_id.clone(),
        })
    }
}
