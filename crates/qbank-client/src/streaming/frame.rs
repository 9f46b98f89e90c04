//! Frame splitting over decoded text

use std::fmt;

/// Wire protocol of a streaming endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// One JSON object per `\n`-terminated line
    Ndjson,
    /// `LOG: <text>` and `DATA: <json>` lines
    PrefixedLog,
    /// Server-Sent Events, blocks terminated by a blank line
    Sse,
}

impl Protocol {
    /// Text that terminates one frame
    pub fn delimiter(&self) -> &'static str {
        match self {
            Protocol::Ndjson | Protocol::PrefixedLog => "\n",
            Protocol::Sse => "\n\n",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Protocol::Ndjson => "ndjson",
            Protocol::PrefixedLog => "prefixed-log",
            Protocol::Sse => "sse",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulates decoded text and cuts complete frames out of it.
///
/// Invariant: after every `push` the buffer holds only the text after the
/// last delimiter seen.
#[derive(Debug)]
pub struct FrameBuffer {
    delimiter: &'static str,
    buffer: String,
    /// Offset before which no delimiter can start
    scanned: usize,
}

impl FrameBuffer {
    pub fn new(delimiter: &'static str) -> Self {
        debug_assert!(!delimiter.is_empty());
        Self {
            delimiter,
            buffer: String::new(),
            scanned: 0,
        }
    }

    pub fn for_protocol(protocol: Protocol) -> Self {
        Self::new(protocol.delimiter())
    }

    /// Append text and return every frame completed by it, delimiters stripped
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);

        let needle = self.delimiter.as_bytes();
        let mut frames = Vec::new();
        let mut start = 0;
        let mut from = self.scanned;

        while let Some(pos) = find(&self.buffer.as_bytes()[from..], needle) {
            let end = from + pos;
            frames.push(self.buffer[start..end].to_string());
            start = end + needle.len();
            from = start;
        }

        self.buffer.drain(..start);
        // A delimiter may straddle the end; rescan its possible prefix next time
        self.scanned = self.buffer.len().saturating_sub(needle.len() - 1);
        frames
    }

    /// The unterminated tail
    pub fn tail(&self) -> &str {
        &self.buffer
    }

    /// Take the unterminated tail, leaving the buffer empty
    pub fn take_tail(&mut self) -> String {
        self.scanned = 0;
        std::mem::take(&mut self.buffer)
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
