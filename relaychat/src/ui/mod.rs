//! Terminal UI rendering.

pub mod chat_panel;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Layout},
};

use crate::app::ViewSnapshot;

/// Rows taken by the separator and the prompt.
pub const CHROME_ROWS: u16 = 2;

/// Draw one full frame.
pub fn draw(frame: &mut Frame, view: &ViewSnapshot, username: &str) {
    let [messages, separator, prompt] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    chat_panel::render_messages(frame, messages, view, username);
    chat_panel::render_separator(frame, separator);
    chat_panel::render_input(frame, prompt, &view.input, view.is_command);
}

/// How many conversation lines fit a viewport of `height` rows.
#[must_use]
pub fn message_rows(height: u16) -> usize {
    usize::from(height.saturating_sub(CHROME_ROWS))
}

#[cfg(test)]
mod tests {
    use ratatui::{Terminal, backend::TestBackend, buffer::Buffer, style::Color};
    use relaychat_proto::line::ChatLine;

    use super::*;

    fn row_text(buffer: &Buffer, y: u16) -> String {
        (0..buffer.area.width)
            .map(|x| buffer[(x, y)].symbol())
            .collect::<String>()
    }

    fn render(view: &ViewSnapshot, width: u16, height: u16) -> Buffer {
        let mut terminal = Terminal::new(TestBackend::new(width, height)).unwrap();
        terminal.draw(|f| draw(f, view, "alice")).unwrap();
        terminal.backend().buffer().clone()
    }

    #[test]
    fn layout_has_separator_and_prompt() {
        let view = ViewSnapshot {
            lines: vec![ChatLine::new("bob", "hello")],
            input: "typing".to_string(),
            notice: None,
            ..Default::default()
        };
        let buffer = render(&view, 20, 5);

        assert!(row_text(&buffer, 0).starts_with("bob: hello"));
        assert_eq!(row_text(&buffer, 3), "─".repeat(20));
        assert!(row_text(&buffer, 4).starts_with("> typing"));
    }

    #[test]
    fn only_trailing_lines_are_shown() {
        let view = ViewSnapshot {
            lines: (0..10).map(|i| ChatLine::new("bob", format!("m{i}"))).collect(),
            ..Default::default()
        };
        let buffer = render(&view, 20, 5);

        assert!(row_text(&buffer, 0).starts_with("bob: m7"));
        assert!(row_text(&buffer, 2).starts_with("bob: m9"));
    }

    #[test]
    fn own_and_other_senders_differ_in_color() {
        let view = ViewSnapshot {
            lines: vec![ChatLine::new("alice", "mine"), ChatLine::new("bob", "theirs")],
            ..Default::default()
        };
        let buffer = render(&view, 20, 4);

        assert_eq!(buffer[(0, 0)].fg, theme::OWN_SENDER);
        assert_eq!(buffer[(0, 1)].fg, theme::OTHER_SENDER);
    }

    #[test]
    fn command_input_uses_command_color() {
        let view = ViewSnapshot {
            input: "/clear".to_string(),
            is_command: true,
            ..Default::default()
        };
        let buffer = render(&view, 20, 3);
        let first_input_cell = u16::try_from(chat_panel::PROMPT.len()).unwrap();
        assert_eq!(buffer[(first_input_cell, 2)].fg, Color::Red);
    }

    #[test]
    fn notice_is_centered() {
        let view = ViewSnapshot {
            notice: Some("cleared".to_string()),
            ..Default::default()
        };
        let buffer = render(&view, 21, 5);
        // Three message rows; the middle one holds the notice.
        assert_eq!(row_text(&buffer, 1).trim(), "cleared");
        assert_eq!(buffer[(7, 1)].fg, theme::NOTICE);
    }

    #[test]
    fn message_rows_leave_room_for_chrome() {
        assert_eq!(message_rows(24), 22);
        assert_eq!(message_rows(1), 0);
    }
}
