//! Conversation area, separator, and prompt line.

use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    text::{Line, Span},
    widgets::{Clear, Paragraph},
};
use relaychat_proto::line::{ChatLine, SERVER_SENDER};

use super::theme;
use crate::app::ViewSnapshot;

/// Prompt shown before the input buffer.
pub const PROMPT: &str = "> ";

/// Render the trailing messages, oldest at the top.
pub fn render_messages(frame: &mut Frame, area: Rect, view: &ViewSnapshot, username: &str) {
    let skip = view.lines.len().saturating_sub(usize::from(area.height));
    let lines: Vec<Line> = view.lines[skip..]
        .iter()
        .map(|line| message_line(line, username))
        .collect();
    frame.render_widget(Paragraph::new(lines), area);

    if let Some(text) = &view.notice {
        render_notice(frame, area, text);
    }
}

fn message_line<'a>(line: &'a ChatLine, username: &str) -> Line<'a> {
    let color = if line.is_from(username) {
        theme::OWN_SENDER
    } else if line.is_from(SERVER_SENDER) {
        theme::SERVER_SENDER
    } else {
        theme::OTHER_SENDER
    };
    Line::from(vec![
        Span::styled(line.sender.as_str(), theme::sender(color)),
        Span::raw(": "),
        Span::styled(line.text.as_str(), theme::normal()),
    ])
}

/// Draw `text` centered over the conversation area.
fn render_notice(frame: &mut Frame, area: Rect, text: &str) {
    if area.height == 0 {
        return;
    }
    let [row] = Layout::vertical([Constraint::Length(1)])
        .flex(ratatui::layout::Flex::Center)
        .areas(area);
    frame.render_widget(Clear, row);
    frame.render_widget(
        Paragraph::new(Span::styled(text, theme::notice())).alignment(Alignment::Center),
        row,
    );
}

/// Render a full-width separator.
pub fn render_separator(frame: &mut Frame, area: Rect) {
    let rule = "─".repeat(usize::from(area.width));
    frame.render_widget(Paragraph::new(Span::styled(rule, theme::separator())), area);
}

/// Render the prompt and place the cursor after the typed text.
pub fn render_input(frame: &mut Frame, area: Rect, input: &str, is_command: bool) {
    let style = theme::input(is_command);
    let line = Line::from(vec![Span::raw(PROMPT), Span::styled(input, style)]);
    frame.render_widget(Paragraph::new(line), area);

    let typed = u16::try_from(PROMPT.chars().count() + input.chars().count()).unwrap_or(u16::MAX);
    let max_x = area.width.saturating_sub(1);
    frame.set_cursor_position((area.x + typed.min(max_x), area.y));
}
