//! Keyboard input: the line editor and the blocking key reader.
//!
//! Reading a key (blocking, on its own thread) is kept apart from applying
//! it ([`InputLine::apply`], a pure function), so key handling is testable
//! without a terminal.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use relaychat_proto::command::{self, Command};
use relaychat_proto::line::MAX_LINE_LEN;
use tokio::sync::mpsc;

use crate::shutdown::{ExitReason, Shutdown};

/// What applying one key did to the input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Nothing changed.
    Ignored,
    /// The buffer was edited.
    Edited,
    /// Enter on plain text; the buffer has been cleared.
    Submitted(String),
    /// Enter on a `/command`; the buffer has been cleared.
    Command(Command),
    /// Esc or Ctrl-C; the buffer has been cleared.
    Cancel,
}

/// The line the user is typing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLine {
    buffer: String,
    limit: usize,
}

impl Default for InputLine {
    fn default() -> Self {
        Self::with_limit(MAX_LINE_LEN)
    }
}

impl InputLine {
    /// An empty line that accepts at most `limit` bytes.
    #[must_use]
    pub const fn with_limit(limit: usize) -> Self {
        Self {
            buffer: String::new(),
            limit,
        }
    }

    /// Current contents.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    /// Length in characters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.chars().count()
    }

    /// Whether the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Whether the buffer currently holds a command.
    #[must_use]
    pub fn is_command(&self) -> bool {
        command::is_command(&self.buffer)
    }

    /// Apply one key event.
    pub fn apply(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.kind != KeyEventKind::Press {
            return KeyOutcome::Ignored;
        }

        match (key.code, key.modifiers) {
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Esc, _) => {
                self.buffer.clear();
                KeyOutcome::Cancel
            }
            (KeyCode::Enter, _) => self.submit(),
            (KeyCode::Backspace, _) => {
                if self.buffer.pop().is_some() {
                    KeyOutcome::Edited
                } else {
                    KeyOutcome::Ignored
                }
            }
            (KeyCode::Char(c), modifiers)
                if !modifiers.intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
                    && !c.is_control() =>
            {
                if self.buffer.len() + c.len_utf8() > self.limit {
                    return KeyOutcome::Ignored;
                }
                self.buffer.push(c);
                KeyOutcome::Edited
            }
            _ => KeyOutcome::Ignored,
        }
    }

    fn submit(&mut self) -> KeyOutcome {
        if self.buffer.is_empty() {
            return KeyOutcome::Ignored;
        }
        let text = std::mem::take(&mut self.buffer);
        match Command::parse(&text) {
            Some(command) => KeyOutcome::Command(command),
            None => KeyOutcome::Submitted(text),
        }
    }
}

/// Read terminal key events on a dedicated thread and forward them.
///
/// The thread polls with `poll_interval` so it notices shutdown, and stops
/// when shutdown starts, the receiver is dropped, or the terminal fails.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_key_reader(
    tx: mpsc::Sender<KeyEvent>,
    shutdown: Arc<Shutdown>,
    poll_interval: Duration,
) -> io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name("key-reader".to_string())
        .spawn(move || {
            while !shutdown.is_triggered() {
                match event::poll(poll_interval) {
                    Ok(false) => {}
                    Ok(true) => match event::read() {
                        Ok(Event::Key(key)) => {
                            if tx.blocking_send(key).is_err() {
                                break;
                            }
                        }
                        // Resizes are picked up by the render tick.
                        Ok(_) => {}
                        Err(e) => {
                            tracing::error!(error = %e, "failed to read terminal event");
                            shutdown.trigger(ExitReason::Failed);
                            break;
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "failed to poll terminal events");
                        shutdown.trigger(ExitReason::Failed);
                        break;
                    }
                }
            }
            tracing::debug!("key reader stopped");
        })
}
