//! Client coordinator: wires the session, the shared state, and the three
//! activities (input, receive, render) together.
//!
//! # Architecture
//!
//! ```text
//! key-reader thread ── KeyEvent ──> input activity ──┐
//!                                                    ├──> SharedState ──> render tick ──> Terminal
//! SessionReader ──────────────────> receive activity ┘
//! ```
//!
//! Input and receive run as supervised tasks in a `JoinSet`; the render tick
//! runs on the task that owns the terminal. Every activity stops once the
//! [`Shutdown`] token carries a reason.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use crossterm::event::KeyEvent;
use ratatui::{Terminal, backend::Backend};
use relaychat_proto::command::Command;
use relaychat_proto::line::{ChatLine, DISCONNECT_NOTICE, JOIN_NOTICE, max_text_len};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::app::{RenderGate, SharedState};
use crate::input::{InputLine, KeyOutcome};
use crate::session::{SessionError, SessionReader, SessionWriter};
use crate::shutdown::{ExitReason, Shutdown};
use crate::ui;

/// Notice shown after `/clear`.
pub const CLEARED_NOTICE: &str = "Local conversation cleared!";

/// Default time the `/clear` notice stays visible.
pub const DEFAULT_NOTICE_DURATION: Duration = Duration::from_secs(1);

/// One user's chat session.
pub struct ChatClient {
    username: String,
    state: Arc<SharedState>,
    writer: SessionWriter,
    shutdown: Arc<Shutdown>,
    notice_duration: Duration,
}

impl ChatClient {
    /// Create a client that sends through `writer` as `username`.
    ///
    /// Typing is capped so every encoded line fits in one relay read.
    #[must_use]
    pub fn new(username: impl Into<String>, writer: SessionWriter, shutdown: Arc<Shutdown>) -> Self {
        let username = username.into();
        let input = InputLine::with_limit(max_text_len(&username));
        Self {
            username,
            state: Arc::new(SharedState::with_input_line(input)),
            writer,
            shutdown,
            notice_duration: DEFAULT_NOTICE_DURATION,
        }
    }

    /// Override how long transient notices stay visible.
    #[must_use]
    pub const fn with_notice_duration(mut self, duration: Duration) -> Self {
        self.notice_duration = duration;
        self
    }

    /// The local user's name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Shared view state.
    #[must_use]
    pub const fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// The shutdown token.
    #[must_use]
    pub const fn shutdown(&self) -> &Arc<Shutdown> {
        &self.shutdown
    }

    /// Tell the room this user has arrived.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the notice cannot be written.
    pub async fn announce_join(&self) -> Result<(), SessionError> {
        let line = ChatLine::new(self.username.as_str(), JOIN_NOTICE);
        self.writer.send(&line.to_string()).await
    }

    /// Apply one key event and perform its effects.
    pub async fn handle_key(&self, key: KeyEvent) {
        let outcome = self.state.with_input(|input| input.apply(key));
        match outcome {
            KeyOutcome::Ignored => {}
            KeyOutcome::Edited => self.state.mark_dirty(),
            KeyOutcome::Submitted(text) => self.send_message(text).await,
            KeyOutcome::Command(Command::Clear) => self.clear_conversation(),
            KeyOutcome::Command(Command::Exit) | KeyOutcome::Cancel => {
                self.leave(ExitReason::UserRequested).await;
            }
            KeyOutcome::Command(other) => {
                tracing::debug!(command = ?other, "ignoring command");
                self.state.mark_dirty();
            }
        }
    }

    /// Log `text` as our own line and send it to the server.
    pub async fn send_message(&self, text: String) {
        let line = ChatLine::new(self.username.as_str(), text);
        let wire = line.to_string();
        self.state.push_line(line);
        if let Err(e) = self.writer.send(&wire).await {
            tracing::warn!(error = %e, "failed to send message");
        }
    }

    /// Empty the local log and show the cleared notice for a while.
    pub fn clear_conversation(&self) {
        self.state.clear_log();
        let generation = self.state.show_notice(CLEARED_NOTICE);
        let state = Arc::clone(&self.state);
        let duration = self.notice_duration;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            state.dismiss_notice(generation);
        });
    }

    /// Record one line received from the server. Malformed lines are dropped.
    pub fn accept_inbound(&self, raw: &str) {
        match ChatLine::parse(raw) {
            Ok(line) => self.state.push_line(line),
            Err(e) => tracing::trace!(error = %e, raw, "dropping malformed line"),
        }
    }

    /// Graceful shutdown.
    ///
    /// Only the first caller sends the disconnect notice, closes the session,
    /// and records `reason`; it gets `true` back. Later callers get `false`.
    pub async fn leave(&self, reason: ExitReason) -> bool {
        if !self.shutdown.trigger(reason) {
            return false;
        }
        tracing::info!(?reason, "leaving chat");
        let line = ChatLine::new(self.username.as_str(), DISCONNECT_NOTICE);
        if let Err(e) = self.writer.send(&line.to_string()).await {
            tracing::debug!(error = %e, "failed to send disconnect notice");
        }
        self.writer.close().await;
        true
    }

    /// The server went away: record it and release the session.
    async fn server_closed(&self) {
        if self.shutdown.trigger(ExitReason::ServerClosed) {
            tracing::info!("server closed the connection");
        }
        self.writer.close().await;
    }
}

/// Apply key events until shutdown or until the key reader goes away.
pub async fn input_activity(client: Arc<ChatClient>, mut keys: mpsc::Receiver<KeyEvent>) {
    let mut signal = client.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = signal.triggered() => break,
            key = keys.recv() => match key {
                Some(key) => client.handle_key(key).await,
                None => {
                    tracing::debug!("key channel closed");
                    break;
                }
            },
        }
    }
}

/// Receive lines until shutdown or until the server closes the session.
pub async fn receive_activity(client: Arc<ChatClient>, mut reader: SessionReader) {
    let mut signal = client.shutdown.subscribe();
    loop {
        tokio::select! {
            _ = signal.triggered() => break,
            received = reader.receive() => match received {
                Ok(Some(raw)) => client.accept_inbound(&raw),
                Ok(None) => {
                    client.server_closed().await;
                    break;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "receive failed");
                    client.server_closed().await;
                    break;
                }
            },
        }
    }
}

/// Run one render tick. Returns whether a frame was drawn.
///
/// # Errors
///
/// Returns an error if the terminal cannot be queried or drawn to.
pub fn render_tick<B: Backend>(
    client: &ChatClient,
    gate: &mut RenderGate,
    terminal: &mut Terminal<B>,
) -> io::Result<bool> {
    let size = terminal.size()?;
    let dirty = client.state.take_dirty();
    if !gate.should_redraw(dirty, client.state.input_len(), size) {
        return Ok(false);
    }
    let view = client.state.snapshot(ui::message_rows(size.height));
    terminal.draw(|frame| ui::draw(frame, &view, &client.username))?;
    Ok(true)
}

/// Drive a connected client until shutdown.
///
/// Spawns the input and receive activities, renders every `tick`, and
/// returns the recorded exit reason once all activities have stopped. A
/// panicked activity shuts the session down with [`ExitReason::Failed`].
///
/// # Errors
///
/// Returns an error if drawing to the terminal fails.
pub async fn run<B: Backend>(
    client: Arc<ChatClient>,
    reader: SessionReader,
    keys: mpsc::Receiver<KeyEvent>,
    terminal: &mut Terminal<B>,
    tick: Duration,
) -> io::Result<ExitReason> {
    let mut activities = JoinSet::new();
    activities.spawn(input_activity(Arc::clone(&client), keys));
    activities.spawn(receive_activity(Arc::clone(&client), reader));

    let mut signal = client.shutdown.subscribe();
    let mut gate = RenderGate::default();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let outcome = loop {
        tokio::select! {
            reason = signal.triggered() => break Ok(reason),
            Some(joined) = activities.join_next() => {
                if let Err(e) = joined
                    && e.is_panic()
                {
                    tracing::error!(error = %e, "client activity panicked");
                    client.shutdown.trigger(ExitReason::Failed);
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = render_tick(&client, &mut gate, terminal) {
                    tracing::error!(error = %e, "render failed");
                    client.shutdown.trigger(ExitReason::Failed);
                    break Err(e);
                }
            }
        }
    };

    while let Some(joined) = activities.join_next().await {
        if let Err(e) = joined
            && e.is_panic()
        {
            tracing::error!(error = %e, "client activity panicked during shutdown");
        }
    }
    client.writer.close().await;

    outcome
}
