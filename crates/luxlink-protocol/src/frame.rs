//! Incremental message framing for the terminal link.
//!
//! The processor's terminal interleaves status lines with prompt text, so
//! messages are bounded by more than a plain line terminator:
//!
//! - **Delimiters** end a message and are discarded: the line terminator
//!   and the two command-prompt markers.
//! - The **login prompt** is a short-circuit token: it ends a message and
//!   is kept as part of it, so an outer layer can recognize it verbatim
//!   and run the login sequence.
//!
//! Delimiters take priority: if any delimiter is present anywhere in the
//! unconsumed buffer, it is processed first, even when the login prompt
//! occurs earlier in the data. The short-circuit scan only runs when no
//! delimiter is present at all.

use bytes::{Buf, BytesMut};

/// Message delimiters, in priority order on position ties. Discarded from
/// the emitted message.
pub const DELIMITERS: [&str; 3] = ["\r\n", "QNET> ", "NET> "];

/// Login prompt short-circuit token. Kept in the emitted message.
pub const LOGIN_PROMPT: &str = "login: ";

/// Stateful incremental chunker that turns arbitrary-length fragments of
/// terminal output into complete messages.
///
/// Not safe for concurrent feeding; the transport's read loop is expected
/// to be the single producer.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    /// Accumulated data with no terminator found yet.
    buffer: BytesMut,
}

impl FrameBuffer {
    /// Create a new, empty frame buffer.
    pub fn new() -> Self {
        FrameBuffer {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Feed a chunk of received characters.
    ///
    /// Returns every message completed by this chunk, in order; the result
    /// may be empty, and data after the last terminator stays buffered for
    /// the next call. Splitting a stream at any character boundary yields
    /// the same messages as feeding it whole.
    pub fn feed(&mut self, chunk: &str) -> Vec<String> {
        self.buffer.extend_from_slice(chunk.as_bytes());

        let mut messages = Vec::new();
        loop {
            if let Some((pos, len)) = self.earliest_delimiter() {
                let frame = self.buffer.split_to(pos);
                self.buffer.advance(len);
                messages.push(String::from_utf8_lossy(&frame).into_owned());
            } else if let Some(pos) = find_subsequence(&self.buffer, LOGIN_PROMPT.as_bytes()) {
                // Token text is part of the message.
                let frame = self.buffer.split_to(pos + LOGIN_PROMPT.len());
                messages.push(String::from_utf8_lossy(&frame).into_owned());
            } else {
                break;
            }
        }
        messages
    }

    /// Discard any partially-accumulated data. Called on disconnect.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Get the number of buffered characters awaiting a terminator.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Find the earliest occurrence of any delimiter in the buffer.
    /// Returns the position and delimiter length.
    fn earliest_delimiter(&self) -> Option<(usize, usize)> {
        let mut earliest: Option<(usize, usize)> = None;
        for delimiter in DELIMITERS {
            if let Some(pos) = find_subsequence(&self.buffer, delimiter.as_bytes()) {
                if earliest.map_or(true, |(best, _)| pos < best) {
                    earliest = Some((pos, delimiter.len()));
                }
            }
        }
        earliest
    }
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_message() {
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("~OUTPUT,1,1,50.00\r\n"), vec!["~OUTPUT,1,1,50.00"]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_two_messages_across_chunks() {
        // The line terminator may itself be split across chunks.
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("STATUS\r"), Vec::<String>::new());
        assert_eq!(framer.feed("\nREADY\r\n"), vec!["STATUS", "READY"]);
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let stream = "~OUTPUT,2,1,75.00\r\n~SHADE,7,1,2\r\nQNET> ";
        let whole = FrameBuffer::new().feed(stream);
        for split in 0..=stream.len() {
            let mut framer = FrameBuffer::new();
            let mut messages = framer.feed(&stream[..split]);
            messages.extend(framer.feed(&stream[split..]));
            assert_eq!(messages, whole, "split at {}", split);
        }
    }

    #[test]
    fn test_prompt_markers_are_delimiters() {
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("~AREA,3,6,5QNET> "), vec!["~AREA,3,6,5"]);
        assert_eq!(framer.feed("~AREA,3,8,3NET> "), vec!["~AREA,3,8,3"]);
    }

    #[test]
    fn test_longer_prompt_wins_on_overlap() {
        // "QNET> " contains "NET> "; the earlier match (the full marker)
        // must be the one consumed.
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("okQNET> rest\r\n"), vec!["ok", "rest"]);
    }

    #[test]
    fn test_login_prompt_short_circuit() {
        // The token is emitted as soon as it is seen, with no trailing
        // terminator, and its own text is part of the message.
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("login: "), vec!["login: "]);
        assert_eq!(framer.buffered_len(), 0);
    }

    #[test]
    fn test_login_prompt_keeps_remainder_buffered() {
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("login: abc"), vec!["login: "]);
        assert_eq!(framer.buffered_len(), 3);
    }

    #[test]
    fn test_delimiter_takes_priority_over_earlier_token() {
        // The login prompt occurs before the line terminator, but any
        // delimiter present in the buffer wins: the token is absorbed into
        // the delimited message instead of being emitted on its own.
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("login: ok\r\n"), vec!["login: ok"]);
    }

    #[test]
    fn test_token_emitted_once_delimiter_is_consumed() {
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("ready\r\nlogin: "), vec!["ready", "login: "]);
    }

    #[test]
    fn test_adjacent_delimiters_emit_empty_messages() {
        let mut framer = FrameBuffer::new();
        assert_eq!(framer.feed("\r\n\r\nA\r\n"), vec!["", "", "A"]);
    }

    #[test]
    fn test_clear_discards_partial_data() {
        let mut framer = FrameBuffer::new();
        assert!(framer.feed("~OUTPUT,1,1").is_empty());
        assert_eq!(framer.buffered_len(), 11);
        framer.clear();
        assert_eq!(framer.buffered_len(), 0);
        // Data after a reconnect starts fresh.
        assert_eq!(framer.feed(",50.00\r\n"), vec![",50.00"]);
    }
}
