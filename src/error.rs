//! Error types for the connection library.
//!
//! Protocol-level failures ([`ProtocolError`], [`MessageParseError`]) follow
//! the read path; [`ConnectError`], [`SendError`] and [`RequestError`] are the
//! outcomes surfaced by the public [`Connection`](crate::Connection) API.

use thiserror::Error;

/// Convenience type alias for Results using [`ProtocolError`].
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors on the wire-level read/write path.
///
/// `Io` and `LineTooLong` are fatal to the connection; the reader task
/// transitions to `Disconnected` when it sees one. A malformed single line is
/// *not* represented here — the codec skips it and keeps the stream alive.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    /// I/O error during reading or writing.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A buffered line exceeded the maximum allowed length before a newline
    /// was seen. Recovery would require unbounded buffering, so this is
    /// fatal.
    #[error("line too long: {actual} bytes (limit: {limit})")]
    LineTooLong {
        /// Bytes buffered so far.
        actual: usize,
        /// Maximum allowed line length.
        limit: usize,
    },

    /// Failed to parse an IRC message.
    #[error("invalid message: {string:?}")]
    InvalidMessage {
        /// The offending line, line ending stripped.
        string: String,
        /// The underlying parse error.
        #[source]
        cause: MessageParseError,
    },
}

/// Errors encountered when parsing a single IRC line into a message.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum MessageParseError {
    /// Line was empty after stripping the line ending.
    #[error("empty message")]
    EmptyMessage,

    /// Line was not valid UTF-8.
    #[error("invalid UTF-8 at byte {byte_pos}")]
    InvalidUtf8 {
        /// Byte offset where validation failed.
        byte_pos: usize,
    },

    /// The command token was missing or contained invalid characters.
    #[error("invalid command: {0:?}")]
    InvalidCommand(String),

    /// A prefix was introduced with `:` but no command followed it.
    #[error("unterminated prefix")]
    UnterminatedPrefix,
}

/// Errors establishing a connection.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConnectError {
    /// TCP connect or address resolution failed.
    #[error("connect failed: {0}")]
    Io(#[from] std::io::Error),

    /// The host portion of the address could not be used as a TLS server
    /// name.
    #[error("invalid TLS server name: {0:?}")]
    InvalidServerName(String),

    /// TLS client setup or handshake failed.
    #[error("tls error: {0}")]
    Tls(#[source] std::io::Error),
}

/// Errors from [`Connection::send`](crate::Connection::send) and
/// [`Connection::send_all`](crate::Connection::send_all).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SendError {
    /// The connection is not in the `Connected` state; nothing was written.
    #[error("not connected")]
    NotConnected,

    /// The connection went down before the batch was written.
    #[error("connection closed before the message was written")]
    ConnectionClosed,

    /// The write itself failed on the transport.
    #[error("write failed: {0}")]
    Write(String),
}

/// Errors from [`Connection::request`](crate::Connection::request).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RequestError {
    /// The connection is not in the `Connected` state; nothing was sent.
    #[error("not connected")]
    NotConnected,

    /// The connection transitioned to `Closing`/`Disconnected` while waiting
    /// for the terminal reply. Distinct from a successful (possibly empty)
    /// response.
    #[error("connection closed while waiting for a response")]
    Cancelled,

    /// The outbound messages could not be sent.
    #[error("request send failed: {0}")]
    Send(#[from] SendError),
}
