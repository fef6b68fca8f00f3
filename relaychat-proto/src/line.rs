//! The `sender,text` line convention.
//!
//! Every user payload travels as `"<sender>,<text>\n"`. The sender name may
//! not contain the delimiter, but the text may, so parsing splits on the
//! first comma only.

use std::fmt;
use std::str::FromStr;

/// Separates the sender name from the message text.
pub const DELIMITER: char = ',';

/// Terminates one line on the wire.
pub const TERMINATOR: char = '\n';

/// Sender label used for operator broadcasts from the server console.
pub const SERVER_SENDER: &str = "Server";

/// Size of a single read from a peer socket, in bytes.
pub const READ_BUFFER_SIZE: usize = 1024;

/// Longest line, without its terminator, that fits in one peer read.
///
/// Clients cap what they send to this so the relay forwards each line in a
/// single chunk, and drop anything longer they receive.
pub const MAX_LINE_LEN: usize = READ_BUFFER_SIZE - 1;

/// Text a client announces right after connecting.
pub const JOIN_NOTICE: &str = "joined the chat!";

/// Text a client announces when it leaves on purpose.
pub const DISCONNECT_NOTICE: &str = "disconnected!";

/// Errors produced when a received line does not follow the convention.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LineError {
    /// No delimiter between sender and text.
    #[error("line has no ',' between sender and text")]
    MissingDelimiter,
}

/// Errors produced when a sender name cannot be used on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SenderError {
    /// The name is empty or only whitespace.
    #[error("sender name is empty")]
    Empty,
    /// The name contains the delimiter or a line break.
    #[error("sender name {0:?} contains ',' or a line break")]
    Reserved(String),
}

/// One `(sender, text)` pair of the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatLine {
    /// Display name of the author.
    pub sender: String,
    /// Message body, may contain commas.
    pub text: String,
}

impl ChatLine {
    /// Create a line from its two parts.
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
        }
    }

    /// Parse a received line, splitting on the first delimiter only.
    ///
    /// A trailing `\n` or `\r\n` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`LineError::MissingDelimiter`] if `raw` has no comma.
    pub fn parse(raw: &str) -> Result<Self, LineError> {
        let raw = raw.strip_suffix(TERMINATOR).unwrap_or(raw);
        let raw = raw.strip_suffix('\r').unwrap_or(raw);
        let (sender, text) = raw
            .split_once(DELIMITER)
            .ok_or(LineError::MissingDelimiter)?;
        Ok(Self::new(sender, text))
    }

    /// Encode the line for the wire, terminator included.
    #[must_use]
    pub fn to_wire(&self) -> String {
        format!("{self}{TERMINATOR}")
    }

    /// Whether this line was authored by `name`.
    #[must_use]
    pub fn is_from(&self, name: &str) -> bool {
        self.sender == name
    }
}

impl fmt::Display for ChatLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{DELIMITER}{}", self.sender, self.text)
    }
}

impl FromStr for ChatLine {
    type Err = LineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Bytes of message text left for `sender` once the line is encoded.
#[must_use]
pub const fn max_text_len(sender: &str) -> usize {
    MAX_LINE_LEN.saturating_sub(sender.len() + 1)
}

/// Check that `name` can be used as a sender and return it trimmed.
///
/// # Errors
///
/// Returns [`SenderError`] if the name is empty or contains a reserved
/// character.
pub fn validate_sender(name: &str) -> Result<String, SenderError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SenderError::Empty);
    }
    if name.contains([DELIMITER, TERMINATOR, '\r']) {
        return Err(SenderError::Reserved(name.to_string()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_text_fills_one_read() {
        let text = "x".repeat(max_text_len("alice"));
        let wire = ChatLine::new("alice", text).to_wire();
        assert_eq!(wire.len(), READ_BUFFER_SIZE);
        assert_eq!(max_text_len(&"a".repeat(2000)), 0);
    }

    #[test]
    fn splits_on_first_delimiter_only() {
        let line = ChatLine::parse("alice,hello,world").unwrap();
        assert_eq!(line.sender, "alice");
        assert_eq!(line.text, "hello,world");
    }

    #[test]
    fn missing_delimiter_is_rejected() {
        assert_eq!(
            ChatLine::parse("no delimiter here"),
            Err(LineError::MissingDelimiter)
        );
    }

    #[test]
    fn terminator_is_stripped() {
        assert_eq!(ChatLine::parse("bob,hi\n").unwrap(), ChatLine::new("bob", "hi"));
        assert_eq!(ChatLine::parse("bob,hi\r\n").unwrap(), ChatLine::new("bob", "hi"));
    }

    #[test]
    fn empty_parts_are_allowed() {
        assert_eq!(ChatLine::parse(",").unwrap(), ChatLine::new("", ""));
        assert_eq!(ChatLine::parse("bob,").unwrap(), ChatLine::new("bob", ""));
    }

    #[test]
    fn wire_form_ends_with_terminator() {
        let line = ChatLine::new(SERVER_SENDER, "maintenance at 5");
        assert_eq!(line.to_wire(), "Server,maintenance at 5\n");
        assert_eq!(line.to_string(), "Server,maintenance at 5");
    }

    #[test]
    fn from_str_matches_parse() {
        let line: ChatLine = "carol,a,b".parse().unwrap();
        assert!(line.is_from("carol"));
        assert_eq!(line.text, "a,b");
    }

    #[test]
    fn sender_validation() {
        assert_eq!(validate_sender("  alice "), Ok("alice".to_string()));
        assert_eq!(validate_sender("   "), Err(SenderError::Empty));
        assert!(matches!(
            validate_sender("a,b"),
            Err(SenderError::Reserved(_))
        ));
    }
}
