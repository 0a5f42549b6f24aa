//! IRC message prefix types.
//!
//! A prefix identifies the origin of a message: either a server name or a
//! user's `nick!user@host` identity.

use std::fmt;

/// The origin of an IRC message.
#[derive(Clone, Eq, PartialEq, Debug, Hash)]
pub enum Prefix {
    /// Server name (e.g. `irc.example.com`).
    ServerName(String),
    /// User origin: (nickname, username, hostname). Components other than
    /// the nickname may be empty.
    Nickname(String, String, String),
}

impl Prefix {
    /// Parse a prefix string.
    ///
    /// This is a lenient parser: it never fails, and classifies a bare name
    /// containing a dot (and no `!`/`@` separators) as a server name.
    pub fn parse(s: &str) -> Self {
        #[derive(Copy, Clone, Eq, PartialEq)]
        enum Part {
            Name,
            User,
            Host,
        }

        let mut name = String::new();
        let mut user = String::new();
        let mut host = String::new();
        let mut part = Part::Name;
        let mut is_server = false;

        for c in s.chars() {
            if c == '.' && part == Part::Name {
                is_server = true;
            }

            match c {
                '!' if part == Part::Name => {
                    is_server = false;
                    part = Part::User;
                }
                '@' if part != Part::Host => {
                    is_server = false;
                    part = Part::Host;
                }
                _ => {
                    match part {
                        Part::Name => &mut name,
                        Part::User => &mut user,
                        Part::Host => &mut host,
                    }
                    .push(c);
                }
            }
        }

        if is_server {
            Prefix::ServerName(name)
        } else {
            Prefix::Nickname(name, user, host)
        }
    }

    /// Create a user prefix from nick, user, and host components.
    pub fn user(
        nick: impl Into<String>,
        user: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Prefix::Nickname(nick.into(), user.into(), host.into())
    }

    /// The nickname, if this is a user prefix with a non-empty nick.
    pub fn nick(&self) -> Option<&str> {
        match self {
            Prefix::Nickname(nick, _, _) if !nick.is_empty() => Some(nick),
            _ => None,
        }
    }

    /// The server name, if this is a server prefix.
    pub fn server(&self) -> Option<&str> {
        match self {
            Prefix::ServerName(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Prefix::ServerName(name) => write!(f, "{}", name),
            Prefix::Nickname(name, user, host) => match (&name[..], &user[..], &host[..]) {
                (name, "", "") => write!(f, "{}", name),
                (name, user, "") => write!(f, "{}!{}", name, user),
                (name, "", host) => write!(f, "{}@{}", name, host),
                (name, user, host) => write!(f, "{}!{}@{}", name, user, host),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_user_prefix() {
        let prefix = Prefix::parse("nick!user@host.example.com");
        assert_eq!(
            prefix,
            Prefix::Nickname(
                "nick".to_string(),
                "user".to_string(),
                "host.example.com".to_string()
            )
        );
        assert_eq!(prefix.nick(), Some("nick"));
        assert_eq!(prefix.server(), None);
    }

    #[test]
    fn test_parse_server_prefix() {
        let prefix = Prefix::parse("irc.example.com");
        assert_eq!(prefix, Prefix::ServerName("irc.example.com".to_string()));
        assert_eq!(prefix.server(), Some("irc.example.com"));
        assert_eq!(prefix.nick(), None);
    }

    #[test]
    fn test_parse_bare_nick() {
        // No dot and no separators: a plain nickname.
        let prefix = Prefix::parse("nick");
        assert_eq!(prefix.nick(), Some("nick"));
    }

    #[test]
    fn test_parse_nick_with_host_only() {
        let prefix = Prefix::parse("nick@host");
        assert_eq!(
            prefix,
            Prefix::Nickname("nick".to_string(), String::new(), "host".to_string())
        );
    }

    #[test]
    fn test_display_round_trip() {
        for raw in ["nick!user@host", "nick@host", "nick!user", "nick", "irc.example.com"] {
            assert_eq!(Prefix::parse(raw).to_string(), raw);
        }
    }

    #[test]
    fn test_dotted_host_does_not_make_server() {
        // The dot heuristic only applies to the name part.
        let prefix = Prefix::parse("nick!user@host.example.com");
        assert!(matches!(prefix, Prefix::Nickname(..)));
    }
}
