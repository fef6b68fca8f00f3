//! `RelayChat` -- terminal chat client.
//!
//! Connects to a relay server, asks for a username, and opens a full-screen
//! chat view. Configuration via CLI flags, environment variables, or config
//! file (`~/.config/relaychat/config.toml`).
//!
//! ```bash
//! # Connect to 127.0.0.1:8080
//! cargo run --bin relaychat
//!
//! # Connect to another server, skipping the username prompt
//! cargo run --bin relaychat -- 9000 192.168.1.20 --name alice
//! ```
//!
//! In the chat view: Enter sends, `/clear` empties the local log, `/exit`,
//! Esc or Ctrl-C leave.

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use relaychat_proto::line::validate_sender;
use tokio::sync::mpsc;
use tracing_appender::non_blocking::WorkerGuard;

use relaychat::client::{self, ChatClient};
use relaychat::config::{CliArgs, ClientConfig};
use relaychat::input;
use relaychat::session::PeerSession;
use relaychat::shutdown::{ExitReason, Shutdown};

/// Key events buffered between the key reader thread and the input activity.
const KEY_CHANNEL_CAPACITY: usize = 64;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse_or_exit();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to a file; the terminal belongs to the chat view.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());
    tracing::info!("relaychat starting");

    let session = match PeerSession::connect(&config.server_ip, config.port).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(error = %e, "connection failed");
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let username = match resolve_username(config.username.as_deref()) {
        Ok(name) => name,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (writer, reader) = session.split();
    let shutdown = Arc::new(Shutdown::new());
    let client = Arc::new(
        ChatClient::new(username, writer, Arc::clone(&shutdown))
            .with_notice_duration(config.notice_duration),
    );
    if let Err(e) = client.announce_join().await {
        tracing::error!(error = %e, "failed to announce join");
        eprintln!("Failed to join chat: {e}");
        return ExitCode::FAILURE;
    }

    let (key_tx, key_rx) = mpsc::channel(KEY_CHANNEL_CAPACITY);
    let key_reader = match input::spawn_key_reader(key_tx, Arc::clone(&shutdown), config.key_poll)
    {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "failed to start key reader");
            client.leave(ExitReason::Failed).await;
            return ExitCode::FAILURE;
        }
    };

    let result = run_tui(Arc::clone(&client), reader, key_rx, &config).await;

    // No-op after a normal exit; stops the key reader if the view failed early.
    shutdown.trigger(ExitReason::Failed);
    if key_reader.join().is_err() {
        tracing::error!("key reader thread panicked");
    }

    let reason = match result {
        Ok(reason) => reason,
        Err(e) => {
            tracing::error!(error = %e, "terminal error");
            eprintln!("Terminal error: {e}");
            ExitReason::Failed
        }
    };

    if reason == ExitReason::ServerClosed {
        let _ = execute!(
            io::stdout(),
            SetForegroundColor(Color::Red),
            Print("Disconnected from server\n"),
            ResetColor
        );
    }

    tracing::info!(?reason, "relaychat exiting");
    ExitCode::from(reason.exit_code())
}

/// Take over the terminal, run the chat view, and always restore it.
async fn run_tui(
    client: Arc<ChatClient>,
    reader: relaychat::session::SessionReader,
    keys: mpsc::Receiver<crossterm::event::KeyEvent>,
    config: &ClientConfig,
) -> io::Result<ExitReason> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    if let Err(e) = execute!(stdout, EnterAlternateScreen) {
        let _ = disable_raw_mode();
        return Err(e);
    }
    install_panic_hook();

    let outcome = match Terminal::new(CrosstermBackend::new(stdout)) {
        Ok(mut terminal) => {
            let outcome = client::run(client, reader, keys, &mut terminal, config.render_tick).await;
            let _ = terminal.show_cursor();
            outcome
        }
        Err(e) => Err(e),
    };

    restore_terminal();
    outcome
}

fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

/// Restore the terminal before the default panic report is printed.
fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        restore_terminal();
        default_hook(info);
    }));
}

/// Use the configured name, or prompt on stdin until a valid one is given.
fn resolve_username(configured: Option<&str>) -> io::Result<String> {
    if let Some(name) = configured {
        return validate_sender(name).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e));
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        write!(stdout, "Enter username: ")?;
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no username entered",
            ));
        }
        match validate_sender(&line) {
            Ok(name) => return Ok(name),
            Err(e) => writeln!(stdout, "Invalid username: {e}")?,
        }
    }
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("relaychat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
