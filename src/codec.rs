//! Tokio codec for framing IRC messages.
//!
//! The decoder splits the byte stream on newlines (accepting both CRLF and
//! bare LF), enforces a line-length cap, and parses each line into a
//! [`Message`]. A line that cannot be decoded — invalid UTF-8, unparsable
//! grammar, or an oversized-but-complete line — is reported to the log and
//! skipped, so a single bad frame never takes the connection down. Only I/O
//! failures and a buffered line growing past the cap with no newline in
//! sight are fatal.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::{trace, warn};

use crate::error::{self, ProtocolError};
use crate::message::Message;

/// Default maximum line length in bytes (RFC 1459 message limit).
pub const DEFAULT_MAX_LINE_LEN: usize = 512;

/// Codec converting between raw IRC lines and [`Message`] values.
pub struct IrcCodec {
    /// Index of the next byte to check for a newline.
    next_index: usize,
    /// Maximum accepted line length in bytes, line ending included.
    max_len: usize,
}

impl IrcCodec {
    /// Create a codec with the standard 512-byte line limit.
    pub fn new() -> Self {
        Self {
            next_index: 0,
            max_len: DEFAULT_MAX_LINE_LEN,
        }
    }

    /// Create a codec with a custom maximum line length.
    pub fn with_max_len(max_len: usize) -> Self {
        Self {
            next_index: 0,
            max_len,
        }
    }
}

impl Default for IrcCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for IrcCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> error::Result<Option<Message>> {
        loop {
            let Some(offset) = src[self.next_index..].iter().position(|b| *b == b'\n') else {
                // No complete line yet; remember where the scan stopped.
                self.next_index = src.len();

                if src.len() > self.max_len {
                    return Err(ProtocolError::LineTooLong {
                        actual: src.len(),
                        limit: self.max_len,
                    });
                }
                return Ok(None);
            };

            let line = src.split_to(self.next_index + offset + 1);
            self.next_index = 0;

            if line.len() > self.max_len {
                warn!(len = line.len(), limit = self.max_len, "dropping oversized line");
                continue;
            }

            let text = match std::str::from_utf8(&line) {
                Ok(text) => text,
                Err(e) => {
                    warn!(byte_pos = e.valid_up_to(), "dropping non-UTF-8 line");
                    continue;
                }
            };

            let trimmed = text.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                trace!("skipping empty line");
                continue;
            }

            match trimmed.parse::<Message>() {
                Ok(message) => return Ok(Some(message)),
                Err(e) => {
                    warn!(line = %trimmed, error = %e, "dropping unparsable line");
                    continue;
                }
            }
        }
    }
}

impl Encoder<Message> for IrcCodec {
    type Error = ProtocolError;

    fn encode(&mut self, message: Message, dst: &mut BytesMut) -> error::Result<()> {
        let mut line = message.to_string();

        // Truncate at any embedded line ending so message content cannot
        // smuggle extra commands onto the wire.
        if let Some(pos) = line.find(['\r', '\n']) {
            line.truncate(pos);
        }

        dst.reserve(line.len() + 2);
        dst.extend_from_slice(line.as_bytes());
        dst.extend_from_slice(b"\r\n");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_complete_line() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :test\r\n".as_bytes());

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
        assert_eq!(msg.params, vec!["test"]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_partial_line() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :te".as_bytes());

        assert!(codec.decode(&mut buf).unwrap().is_none());

        // Completing the line yields the message.
        buf.extend_from_slice(b"st\r\n");
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.params, vec!["test"]);
    }

    #[test]
    fn test_decode_lf_only() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("PING :test\n".as_bytes());

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        // A bad frame between two good ones must not poison the stream.
        let mut codec = IrcCodec::new();
        let mut buf =
            BytesMut::from("PRIVMSG #a :one\r\n:broken\r\nPRIVMSG #a :two\r\n".as_bytes());

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.params, vec!["#a", "one"]);

        // The unterminated-prefix line is consumed silently; decode returns
        // the next valid message.
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.params, vec!["#a", "two"]);
    }

    #[test]
    fn test_invalid_utf8_line_is_skipped() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(b"PING \xff\xfe\r\nPING :ok\r\n");

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.params, vec!["ok"]);
    }

    #[test]
    fn test_oversized_complete_line_is_skipped() {
        let mut codec = IrcCodec::with_max_len(32);
        let mut buf = BytesMut::new();
        buf.extend_from_slice(format!("PRIVMSG #a :{}\r\n", "x".repeat(64)).as_bytes());
        buf.extend_from_slice(b"PING :ok\r\n");

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_overflow_without_newline_is_fatal() {
        let mut codec = IrcCodec::with_max_len(16);
        let mut buf = BytesMut::from("x".repeat(64).as_bytes());

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(ProtocolError::LineTooLong { .. })));
    }

    #[test]
    fn test_empty_lines_are_tolerated() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::from("\r\n\r\nPING :x\r\n".as_bytes());

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.command, "PING");
    }

    #[test]
    fn test_encode_appends_crlf() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Message::privmsg("#test", "hello world"), &mut buf)
            .unwrap();
        assert_eq!(&buf[..], b"PRIVMSG #test :hello world\r\n");
    }

    #[test]
    fn test_encode_strips_embedded_newline() {
        let mut codec = IrcCodec::new();
        let mut buf = BytesMut::new();

        codec
            .encode(Message::privmsg("#test", "hello\r\nQUIT"), &mut buf)
            .unwrap();
        let encoded = std::str::from_utf8(&buf).unwrap();
        assert_eq!(encoded, "PRIVMSG #test :hello\r\n");
    }
}
