//! cinder-protocol: the text wire surface.
//!
//! Commands arrive as newline-terminated lines (over TCP, one
//! WebSocket message, or an HTTP body) and are split into tokens with
//! quoting support. Replies are plain text in a RESP-inspired shape:
//!
//! ```text
//! +OK                      simple string
//! -ERR message             error
//! :42                      integer
//! $5\r\nhello              bulk string ($-1 = nil)
//! *2\r\n$1\r\na\r\n$1\r\nb\r\n   array of bulk strings
//! ```

pub mod reply;
pub mod tokenize;

pub use reply::Reply;
pub use tokenize::{join_tokens, tokenize};
