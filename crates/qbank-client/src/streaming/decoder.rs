//! Incremental UTF-8 decoding
//!
//! Network chunks may end in the middle of a multi-byte character. The
//! decoder keeps the incomplete bytes until the next chunk arrives and must
//! be finished at end of stream.

use std::char::REPLACEMENT_CHARACTER;

/// Stateful UTF-8 decoder for chunked input
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    /// Bytes of a code point that is not complete yet (at most 3)
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk.
    ///
    /// Invalid sequences become U+FFFD; a trailing incomplete sequence is
    /// held back for the next call.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.pending);
        input.extend_from_slice(bytes);

        let mut out = String::with_capacity(input.len());
        let mut rest: &[u8] = &input;

        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    break;
                }
                Err(e) => {
                    let (valid, tail) = rest.split_at(e.valid_up_to());
                    if let Ok(valid) = std::str::from_utf8(valid) {
                        out.push_str(valid);
                    }
                    match e.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            rest = &tail[len..];
                        }
                        None => {
                            self.pending = tail.to_vec();
                            break;
                        }
                    }
                }
            }
        }

        out
    }

    /// Flush at end of stream; a dangling partial code point becomes U+FFFD
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            String::new()
        } else {
            self.pending.clear();
            REPLACEMENT_CHARACTER.to_string()
        }
    }

    /// Whether an incomplete code point is buffered
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
