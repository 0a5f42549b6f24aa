//! Declarative message filters.
//!
//! A [`MessageFilter`] is a pure predicate over a [`Message`]: it has no side
//! effects, never fails, and is safe to evaluate concurrently from the reader
//! task and any number of waiting tasks. Filters select which messages a
//! listener or a pending request cares about, and compose with
//! [`and`](MessageFilter::and), [`or`](MessageFilter::or) and
//! [`negate`](MessageFilter::negate).

use std::fmt;
use std::sync::Arc;

use crate::message::Message;

/// A composable predicate over [`Message`] values.
///
/// # Example
///
/// ```
/// use irc_link::{Message, MessageFilter};
///
/// let filter = MessageFilter::command("PRIVMSG")
///     .and(MessageFilter::param(0, "#rust"));
///
/// assert!(filter.matches(&Message::privmsg("#rust", "hi")));
/// assert!(!filter.matches(&Message::privmsg("#other", "hi")));
/// ```
#[derive(Clone, Debug)]
pub struct MessageFilter {
    kind: Kind,
}

#[derive(Clone)]
enum Kind {
    Any,
    Command(String),
    Source(String),
    Param(usize, String),
    Predicate(Arc<dyn Fn(&Message) -> bool + Send + Sync>),
    All(Vec<MessageFilter>),
    AnyOf(Vec<MessageFilter>),
    Not(Box<MessageFilter>),
}

impl MessageFilter {
    /// A filter that accepts every message.
    pub fn any() -> Self {
        Self { kind: Kind::Any }
    }

    /// Accepts messages whose command equals `command` (ASCII
    /// case-insensitive).
    pub fn command(command: impl Into<String>) -> Self {
        Self {
            kind: Kind::Command(command.into()),
        }
    }

    /// Accepts numeric replies with the given code (e.g. `353` for
    /// `RPL_NAMREPLY`).
    pub fn numeric(code: u16) -> Self {
        Self {
            kind: Kind::Command(format!("{:03}", code)),
        }
    }

    /// Accepts messages whose rendered origin prefix matches the IRC
    /// wildcard `mask` (`*` and `?`, ASCII case-insensitive). Messages
    /// without a prefix never match.
    pub fn source(mask: impl Into<String>) -> Self {
        Self {
            kind: Kind::Source(mask.into()),
        }
    }

    /// Accepts messages whose parameter at `index` equals `value`.
    ///
    /// An index past the end of the parameter list evaluates to `false`,
    /// never an error.
    pub fn param(index: usize, value: impl Into<String>) -> Self {
        Self {
            kind: Kind::Param(index, value.into()),
        }
    }

    /// Accepts messages for which `predicate` returns `true`.
    pub fn predicate(predicate: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        Self {
            kind: Kind::Predicate(Arc::new(predicate)),
        }
    }

    /// Accepts messages matching both `self` and `other`.
    ///
    /// Evaluation short-circuits at the first non-match.
    #[must_use]
    pub fn and(self, other: MessageFilter) -> Self {
        Self {
            kind: Kind::All(vec![self, other]),
        }
    }

    /// Accepts messages matching `self` or `other`.
    ///
    /// Evaluation short-circuits at the first match.
    #[must_use]
    pub fn or(self, other: MessageFilter) -> Self {
        Self {
            kind: Kind::AnyOf(vec![self, other]),
        }
    }

    /// Accepts exactly the messages `self` rejects.
    #[must_use]
    pub fn negate(self) -> Self {
        Self {
            kind: Kind::Not(Box::new(self)),
        }
    }

    /// Evaluate the filter against a message.
    pub fn matches(&self, message: &Message) -> bool {
        match &self.kind {
            Kind::Any => true,
            Kind::Command(command) => message.command.eq_ignore_ascii_case(command),
            Kind::Source(mask) => match &message.prefix {
                Some(prefix) => wildcard_match(mask, &prefix.to_string()),
                None => false,
            },
            Kind::Param(index, value) => message.param(*index) == Some(value.as_str()),
            Kind::Predicate(predicate) => predicate(message),
            Kind::All(filters) => filters.iter().all(|f| f.matches(message)),
            Kind::AnyOf(filters) => filters.iter().any(|f| f.matches(message)),
            Kind::Not(filter) => !filter.matches(message),
        }
    }
}

impl fmt::Debug for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Kind::Any => write!(f, "Any"),
            Kind::Command(c) => f.debug_tuple("Command").field(c).finish(),
            Kind::Source(m) => f.debug_tuple("Source").field(m).finish(),
            Kind::Param(i, v) => f.debug_tuple("Param").field(i).field(v).finish(),
            Kind::Predicate(_) => write!(f, "Predicate(..)"),
            Kind::All(fs) => f.debug_tuple("All").field(fs).finish(),
            Kind::AnyOf(fs) => f.debug_tuple("AnyOf").field(fs).finish(),
            Kind::Not(inner) => f.debug_tuple("Not").field(inner).finish(),
        }
    }
}

/// Match `text` against an IRC wildcard pattern.
///
/// `*` matches any run of characters (including empty), `?` matches exactly
/// one. Comparison is ASCII case-insensitive.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().map(|c| c.to_ascii_lowercase()).collect();
    let text: Vec<char> = text.chars().map(|c| c.to_ascii_lowercase()).collect();

    let mut p = 0;
    let mut t = 0;
    let mut star_p = None;
    let mut star_t = 0;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            // Remember the star position for backtracking.
            star_p = Some(p);
            star_t = t;
            p += 1;
        } else if let Some(sp) = star_p {
            // Mismatch: backtrack to the last star and consume one more char.
            p = sp + 1;
            star_t += 1;
            t = star_t;
        } else {
            return false;
        }
    }

    // Only trailing stars may remain.
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}
