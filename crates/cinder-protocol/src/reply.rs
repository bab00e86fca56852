//! Text reply formatting.
//!
//! Every command handler produces a [`Reply`], which renders to the
//! wire text the framing layer sends (followed by one trailing CRLF
//! that the framing layer owns).

use std::fmt;

/// A command reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `+<text>` — simple string.
    Simple(String),
    /// `-ERR <text>` — error.
    Error(String),
    /// `:<n>` — integer.
    Integer(i64),
    /// `$<len>\r\n<data>` — bulk string.
    Bulk(String),
    /// `$-1` — nil bulk.
    Nil,
    /// `*<n>` followed by one bulk per item, each CRLF-terminated.
    Array(Vec<String>),
    /// Preformatted text passed through untouched (transaction EXEC
    /// concatenates per-command replies itself).
    Raw(String),
}

impl Reply {
    /// `+OK`.
    pub fn ok() -> Self {
        Reply::Simple("OK".into())
    }

    /// `-ERR <message>`.
    pub fn error(message: impl fmt::Display) -> Self {
        Reply::Error(message.to_string())
    }

    /// Renders the reply to its wire text.
    pub fn to_wire(&self) -> String {
        match self {
            Reply::Simple(s) => format!("+{s}"),
            Reply::Error(msg) => format!("-ERR {msg}"),
            Reply::Integer(n) => format!(":{n}"),
            Reply::Bulk(data) => format!("${}\r\n{}", data.len(), data),
            Reply::Nil => "$-1".to_owned(),
            Reply::Array(items) => {
                let mut out = format!("*{}\r\n", items.len());
                for item in items {
                    out.push_str(&format!("${}\r\n{}\r\n", item.len(), item));
                }
                out
            }
            Reply::Raw(text) => text.clone(),
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_ok() {
        assert_eq!(Reply::ok().to_wire(), "+OK");
        assert_eq!(Reply::Simple("QUEUED".into()).to_wire(), "+QUEUED");
    }

    #[test]
    fn error_gets_err_prefix() {
        assert_eq!(
            Reply::error("GET requires a key").to_wire(),
            "-ERR GET requires a key"
        );
    }

    #[test]
    fn integer() {
        assert_eq!(Reply::Integer(42).to_wire(), ":42");
        assert_eq!(Reply::Integer(-1).to_wire(), ":-1");
    }

    #[test]
    fn bulk_uses_byte_length() {
        assert_eq!(Reply::Bulk("bar".into()).to_wire(), "$3\r\nbar");
        assert_eq!(Reply::Bulk(String::new()).to_wire(), "$0\r\n");
    }

    #[test]
    fn nil_bulk() {
        assert_eq!(Reply::Nil.to_wire(), "$-1");
    }

    #[test]
    fn array_of_bulks() {
        let reply = Reply::Array(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(reply.to_wire(), "*3\r\n$1\r\na\r\n$1\r\nb\r\n$1\r\nc\r\n");
    }

    #[test]
    fn empty_array() {
        assert_eq!(Reply::Array(Vec::new()).to_wire(), "*0\r\n");
    }

    #[test]
    fn raw_passes_through() {
        assert_eq!(Reply::Raw("+OK\r\n+OK".into()).to_wire(), "+OK\r\n+OK");
    }
}
