//! The parsed IRC protocol unit.
//!
//! A [`Message`] is an immutable value: an optional origin [`Prefix`], a
//! command, and an ordered parameter list. Messages are freely shared across
//! tasks and never mutated after construction.

use std::fmt;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

/// An IRC message.
///
/// # Example
///
/// ```
/// use irc_link::Message;
///
/// // Parse a message
/// let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
/// assert_eq!(msg.command, "PRIVMSG");
/// assert_eq!(msg.param(1), Some("Hello!"));
///
/// // Construct a message
/// let msg = Message::privmsg("#channel", "Hello, world!");
/// assert_eq!(msg.to_string(), "PRIVMSG #channel :Hello, world!");
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Message {
    /// Message origin (e.g. `nick!user@host`), when relayed by the peer.
    pub prefix: Option<Prefix>,
    /// The command name (`PRIVMSG`, `PING`, ...) or three-digit numeric.
    pub command: String,
    /// Ordered command parameters. A trailing parameter is stored without
    /// its leading `:`.
    pub params: Vec<String>,
}

impl Message {
    /// Create a message from a command and parameters, without a prefix.
    pub fn new(command: impl Into<String>, params: Vec<String>) -> Self {
        Message {
            prefix: None,
            command: command.into(),
            params,
        }
    }

    /// Set the origin of this message.
    #[must_use]
    pub fn with_prefix(mut self, prefix: Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    /// The parameter at `index`, if present.
    pub fn param(&self, index: usize) -> Option<&str> {
        self.params.get(index).map(String::as_str)
    }

    /// The nickname from the message prefix, if present.
    pub fn source_nickname(&self) -> Option<&str> {
        self.prefix.as_ref().and_then(Prefix::nick)
    }

    /// The target to reply to: the channel for channel-directed PRIVMSG and
    /// NOTICE, the sender's nickname otherwise.
    pub fn response_target(&self) -> Option<&str> {
        if self.command.eq_ignore_ascii_case("PRIVMSG")
            || self.command.eq_ignore_ascii_case("NOTICE")
        {
            if let Some(target) = self.param(0) {
                if target.starts_with('#') || target.starts_with('&') {
                    return Some(target);
                }
            }
        }
        self.source_nickname()
    }

    /// Create a PRIVMSG to a target.
    #[must_use]
    pub fn privmsg(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("PRIVMSG", vec![target.into(), text.into()])
    }

    /// Create a NOTICE to a target.
    #[must_use]
    pub fn notice(target: impl Into<String>, text: impl Into<String>) -> Self {
        Message::new("NOTICE", vec![target.into(), text.into()])
    }

    /// Create a JOIN for a channel.
    #[must_use]
    pub fn join(channel: impl Into<String>) -> Self {
        Message::new("JOIN", vec![channel.into()])
    }

    /// Create a PART for a channel.
    #[must_use]
    pub fn part(channel: impl Into<String>) -> Self {
        Message::new("PART", vec![channel.into()])
    }

    /// Create a NICK message.
    #[must_use]
    pub fn nick(nickname: impl Into<String>) -> Self {
        Message::new("NICK", vec![nickname.into()])
    }

    /// Create a USER registration message.
    #[must_use]
    pub fn user(username: impl Into<String>, realname: impl Into<String>) -> Self {
        Message::new(
            "USER",
            vec![username.into(), "0".into(), "*".into(), realname.into()],
        )
    }

    /// Create a PING message.
    #[must_use]
    pub fn ping(token: impl Into<String>) -> Self {
        Message::new("PING", vec![token.into()])
    }

    /// Create a PONG reply.
    #[must_use]
    pub fn pong(token: impl Into<String>) -> Self {
        Message::new("PONG", vec![token.into()])
    }

    /// Create a QUIT message with a parting reason.
    #[must_use]
    pub fn quit(reason: impl Into<String>) -> Self {
        Message::new("QUIT", vec![reason.into()])
    }

    /// Create a NAMES query for a channel.
    #[must_use]
    pub fn names(channel: impl Into<String>) -> Self {
        Message::new("NAMES", vec![channel.into()])
    }
}

fn valid_command(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric())
}

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let invalid = |cause: MessageParseError| ProtocolError::InvalidMessage {
            string: s.trim_end_matches(['\r', '\n']).to_owned(),
            cause,
        };

        let mut rest = s.trim_end_matches(['\r', '\n']);
        if rest.is_empty() {
            return Err(invalid(MessageParseError::EmptyMessage));
        }

        let prefix = if let Some(after) = rest.strip_prefix(':') {
            match after.split_once(' ') {
                Some((raw, tail)) => {
                    rest = tail.trim_start_matches(' ');
                    Some(Prefix::parse(raw))
                }
                None => return Err(invalid(MessageParseError::UnterminatedPrefix)),
            }
        } else {
            None
        };

        let (command, mut rest) = match rest.split_once(' ') {
            Some((cmd, tail)) => (cmd, tail.trim_start_matches(' ')),
            None => (rest, ""),
        };
        if !valid_command(command) {
            return Err(invalid(MessageParseError::InvalidCommand(
                command.to_owned(),
            )));
        }

        let mut params = Vec::new();
        while !rest.is_empty() {
            if let Some(trailing) = rest.strip_prefix(':') {
                params.push(trailing.to_owned());
                break;
            }
            match rest.split_once(' ') {
                Some((param, tail)) => {
                    params.push(param.to_owned());
                    rest = tail.trim_start_matches(' ');
                }
                None => {
                    params.push(rest.to_owned());
                    break;
                }
            }
        }

        Ok(Message {
            prefix,
            command: command.to_owned(),
            params,
        })
    }
}

impl fmt::Display for Message {
    /// Serializes to the wire form, without a line ending; the codec appends
    /// CRLF when framing.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref prefix) = self.prefix {
            write!(f, ":{} ", prefix)?;
        }

        write!(f, "{}", self.command)?;

        let last = self.params.len().saturating_sub(1);
        for (i, param) in self.params.iter().enumerate() {
            let needs_colon =
                i == last && (param.is_empty() || param.contains(' ') || param.starts_with(':'));
            if needs_colon {
                write!(f, " :{}", param)?;
            } else {
                write!(f, " {}", param)?;
            }
        }

        Ok(())
    }
}
