//! # irc-link
//!
//! A filter-driven IRC connection library.
//!
//! `irc-link` models a single logical channel to a remote IRC peer (client to
//! server, server to client, or server to server). It turns the raw framed
//! text stream into typed [`Message`] values, dispatches them to observers
//! registered with declarative [`MessageFilter`]s, and lets a caller perform
//! "send a command, collect the matching response" interactions over the
//! inherently asynchronous, multiplexed stream.
//!
//! ## Quick Start
//!
//! ```no_run
//! use irc_link::{Connection, ConnectOptions, Message, MessageFilter};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let conn = Connection::connect(ConnectOptions::new("irc.libera.chat:6667")).await?;
//!
//! // Observe all PRIVMSGs.
//! conn.add_message_listener(
//!     MessageFilter::command("PRIVMSG"),
//!     std::sync::Arc::new(|msg: &Message| println!("<- {msg}")),
//! );
//!
//! // Send NAMES and collect the 353 replies up to the terminating 366.
//! let names = conn
//!     .request(
//!         MessageFilter::numeric(353),
//!         MessageFilter::numeric(366),
//!         vec![Message::names("#rust")],
//!     )
//!     .await?;
//! println!("{} reply lines", names.len());
//!
//! conn.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! Each connection runs one dedicated reader task (the sole dispatcher of
//! inbound messages, in exact arrival order) and one writer task draining a
//! bounded outbound queue (one queue entry is one contiguous batch, so a
//! multi-message send is never interleaved with another). `request()` is an
//! ephemeral listener plus a completion signal: it registers before the
//! outbound messages are written, so a fast peer cannot reply before the
//! listener exists.

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod codec;
pub mod connection;
pub mod error;
pub mod filter;
pub mod message;
pub mod prefix;
pub mod transport;

pub use self::codec::IrcCodec;
pub use self::connection::{
    Closed, ConnectOptions, Connection, ConnectionState, ConnectionStateListener,
    MessageListener, SendHandle,
};
pub use self::error::{
    ConnectError, MessageParseError, ProtocolError, RequestError, SendError,
};
pub use self::filter::MessageFilter;
pub use self::message::Message;
pub use self::prefix::Prefix;
pub use self::transport::{TlsOptions, TransportStream};
