//! Operator console: local commands and server-wide announcements.
//!
//! Lines are read on a dedicated thread and handed over a channel, so the
//! command handling here never blocks on the terminal.

use std::io::{self, Write};

use crossterm::cursor::MoveTo;
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use relaychat_proto::command::Command;
use relaychat_proto::line::{ChatLine, SERVER_SENDER};
use tokio::sync::mpsc;

use crate::registry::Origin;
use crate::relay::RelayState;

/// Capacity of the stdin line channel.
const CONSOLE_BUFFER: usize = 16;

/// What the operator asked for with one console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleAction {
    /// Clear the local screen.
    Clear,
    /// Print the number of connected clients.
    Users,
    /// Stop the server.
    Exit,
    /// Send the text to every client as `Server,<text>`.
    Announce(String),
    /// Blank line or unknown command.
    Ignore,
}

impl ConsoleAction {
    /// Interpret one line of operator input.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Self::Ignore;
        }
        match Command::parse(line) {
            Some(Command::Clear) => Self::Clear,
            Some(Command::Users) => Self::Users,
            Some(Command::Exit) => Self::Exit,
            Some(Command::Unknown(name)) => {
                tracing::debug!(command = %name, "ignoring unknown console command");
                Self::Ignore
            }
            None => Self::Announce(line.to_string()),
        }
    }
}

/// Why the console loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The operator typed `/exit`.
    Requested,
    /// Console input reached end of file.
    InputClosed,
}

/// Read stdin lines on a dedicated thread.
///
/// The thread ends at end of input or when the receiver is dropped.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_stdin_reader() -> io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(CONSOLE_BUFFER);
    std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to read console input");
                        break;
                    }
                }
            }
        })?;
    Ok(rx)
}

/// Process console lines until `/exit` or end of input.
///
/// # Errors
///
/// Returns an error if writing to `out` fails.
pub async fn run_console<W: Write>(
    lines: &mut mpsc::Receiver<String>,
    out: &mut W,
    state: &RelayState,
) -> io::Result<ConsoleExit> {
    while let Some(line) = lines.recv().await {
        match ConsoleAction::parse(&line) {
            ConsoleAction::Clear => execute!(out, Clear(ClearType::All), MoveTo(0, 0))?,
            ConsoleAction::Users => {
                let count = state.registry.count().await;
                writeln!(out, "Current active users: {count}")?;
                out.flush()?;
            }
            ConsoleAction::Exit => return Ok(ConsoleExit::Requested),
            ConsoleAction::Announce(text) => {
                let line = ChatLine::new(SERVER_SENDER, text);
                let report = state
                    .registry
                    .broadcast(Origin::Server, line.to_wire().as_bytes())
                    .await;
                tracing::info!(delivered = report.delivered, "operator message broadcast");
            }
            ConsoleAction::Ignore => {}
        }
    }
    Ok(ConsoleExit::InputClosed)
}
