//! `RelayChat` server -- rebroadcasts every client message to all others.
//!
//! # Usage
//!
//! ```bash
//! # Listen on 0.0.0.0:8080
//! cargo run --bin relaychat-server
//!
//! # Listen on a custom port
//! cargo run --bin relaychat-server -- 9000
//! ```
//!
//! Console commands: `/clear`, `/users`, `/exit`. Any other line is sent to
//! every client as `Server,<line>`.

use std::process::ExitCode;
use std::sync::Arc;

use relaychat_server::config::{ServerCliArgs, ServerConfig};
use relaychat_server::console::{self, ConsoleExit};
use relaychat_server::relay::{self, RelayState};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = ServerCliArgs::parse_or_exit();

    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Logs go to stderr; stdout belongs to the console.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let state = Arc::new(RelayState::with_config(config.peer_queue_size));
    let server = match relay::start_server_with_state(&config.bind_addr(), state).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %server.local_addr(), "server started, listening");

    let mut lines = match console::spawn_stdin_reader() {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!(error = %e, "failed to start console reader");
            server.shutdown().await;
            return ExitCode::FAILURE;
        }
    };

    let mut stdout = std::io::stdout();
    tokio::select! {
        result = console::run_console(&mut lines, &mut stdout, server.state()) => match result {
            Ok(ConsoleExit::Requested) => tracing::info!("exit requested from console"),
            Ok(ConsoleExit::InputClosed) => {
                tracing::info!("console input closed, press Ctrl-C to stop");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %e, "failed to wait for Ctrl-C");
                }
            }
            Err(e) => tracing::error!(error = %e, "console failed"),
        },
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for Ctrl-C");
            }
            tracing::info!("interrupt received");
        }
    }

    server.shutdown().await;
    ExitCode::SUCCESS
}
