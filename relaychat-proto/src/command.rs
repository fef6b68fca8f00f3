//! Local slash commands shared by the server console and the client.

/// Marks an input line as a local command rather than a message.
pub const COMMAND_PREFIX: char = '/';

/// A local command. Commands never travel over the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/clear`: clear the local screen or conversation.
    Clear,
    /// `/users`: report the number of connected peers (server only).
    Users,
    /// `/exit`: leave or shut down.
    Exit,
    /// Any other `/word`.
    Unknown(String),
}

impl Command {
    /// Parse `input` as a command. Returns `None` if it lacks the prefix.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        let name = input.strip_prefix(COMMAND_PREFIX)?.trim_end();
        Some(match name {
            "clear" => Self::Clear,
            "users" => Self::Users,
            "exit" => Self::Exit,
            other => Self::Unknown(other.to_string()),
        })
    }
}

/// Whether `input` would be interpreted as a command.
#[must_use]
pub fn is_command(input: &str) -> bool {
    input.starts_with(COMMAND_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_commands() {
        assert_eq!(Command::parse("/clear"), Some(Command::Clear));
        assert_eq!(Command::parse("/users"), Some(Command::Users));
        assert_eq!(Command::parse("/exit "), Some(Command::Exit));
    }

    #[test]
    fn unknown_and_plain_text() {
        assert_eq!(
            Command::parse("/dance"),
            Some(Command::Unknown("dance".to_string()))
        );
        assert_eq!(Command::parse("hello /exit"), None);
        assert!(is_command("/anything"));
        assert!(!is_command("plain"));
    }
}
