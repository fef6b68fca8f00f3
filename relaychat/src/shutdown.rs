//! Shutdown token shared by the client activities.
//!
//! The token holds the reason the session ended. Only the first trigger is
//! recorded; every activity holds a [`ShutdownSignal`] and stops once a
//! reason is published.

use tokio::sync::watch;

/// Why the client session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The user typed `/exit` or pressed Esc / Ctrl-C.
    UserRequested,
    /// The server closed the connection unexpectedly.
    ServerClosed,
    /// A local failure (terminal I/O, panicked activity).
    Failed,
}

impl ExitReason {
    /// Process exit status for this reason.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::UserRequested => 0,
            Self::ServerClosed | Self::Failed => 1,
        }
    }
}

/// One-shot shutdown token.
#[derive(Debug)]
pub struct Shutdown {
    tx: watch::Sender<Option<ExitReason>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Create an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish `reason` if nothing was published yet.
    ///
    /// Returns `true` only for the caller whose reason was recorded.
    pub fn trigger(&self, reason: ExitReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    /// The recorded reason, if shutdown has started.
    #[must_use]
    pub fn reason(&self) -> Option<ExitReason> {
        *self.tx.borrow()
    }

    /// Whether shutdown has started.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        self.reason().is_some()
    }

    /// A handle an activity can wait on.
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Receiving side of the shutdown token.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<Option<ExitReason>>,
}

impl ShutdownSignal {
    /// Wait until shutdown starts and return the reason.
    pub async fn triggered(&mut self) -> ExitReason {
        match self.rx.wait_for(Option::is_some).await {
            Ok(reason) => (*reason).unwrap_or(ExitReason::Failed),
            Err(_) => ExitReason::Failed,
        }
    }
}
