//! Colors and styles for the chat view.

use ratatui::style::{Color, Modifier, Style};

/// Sender color for the local user's own messages.
pub const OWN_SENDER: Color = Color::Cyan;

/// Sender color for everyone else.
pub const OTHER_SENDER: Color = Color::Magenta;

/// Sender color for operator broadcasts.
pub const SERVER_SENDER: Color = Color::Yellow;

/// Separator line above the prompt.
pub const SEPARATOR: Color = Color::Blue;

/// Input color while a `/command` is being typed.
pub const COMMAND: Color = Color::Red;

/// Transient notice color.
pub const NOTICE: Color = Color::Green;

/// Normal text style.
#[must_use]
pub fn normal() -> Style {
    Style::default().fg(Color::White)
}

/// Bold style for a sender label.
#[must_use]
pub fn sender(color: Color) -> Style {
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Style for the separator line.
#[must_use]
pub fn separator() -> Style {
    Style::default().fg(SEPARATOR)
}

/// Style for the prompt line, depending on whether it holds a command.
#[must_use]
pub fn input(is_command: bool) -> Style {
    if is_command {
        Style::default().fg(COMMAND)
    } else {
        normal()
    }
}

/// Style for the transient notice.
#[must_use]
pub fn notice() -> Style {
    Style::default().fg(NOTICE).add_modifier(Modifier::BOLD)
}
