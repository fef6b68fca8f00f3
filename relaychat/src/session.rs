//! Peer session: the client's single connection to the relay server.
//!
//! A session is split into a [`SessionWriter`], shared by every activity that
//! needs to send, and a [`SessionReader`], owned by the receive activity.
//! Both halves wrap any `AsyncRead`/`AsyncWrite`, so tests can run a session
//! over an in-memory duplex stream.

use std::io;

use relaychat_proto::line::{MAX_LINE_LEN, READ_BUFFER_SIZE, TERMINATOR};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Errors that can occur on a peer session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The initial connection attempt failed.
    #[error("failed to connect to server at {addr}: {source}")]
    Connect {
        /// Address that was attempted.
        addr: String,
        /// Underlying I/O error.
        source: io::Error,
    },

    /// The session was closed locally.
    #[error("connection closed")]
    Closed,

    /// An underlying I/O error occurred.
    #[error("session I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Connected session, not yet split.
pub struct PeerSession {
    writer: SessionWriter,
    reader: SessionReader,
}

impl PeerSession {
    /// Connect to the relay server at `host:port`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] if the TCP connection fails.
    pub async fn connect(host: &str, port: u16) -> Result<Self, SessionError> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|source| SessionError::Connect {
                addr: format!("{host}:{port}"),
                source,
            })?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(error = %e, "failed to disable Nagle's algorithm");
        }
        tracing::info!(host, port, "connected to server");
        let (read, write) = stream.into_split();
        Ok(Self::from_halves(Box::new(read), Box::new(write)))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read, write) = tokio::io::split(stream);
        Self::from_halves(Box::new(read), Box::new(write))
    }

    fn from_halves(read: BoxedReader, write: BoxedWriter) -> Self {
        Self {
            writer: SessionWriter {
                inner: Mutex::new(Some(write)),
            },
            reader: SessionReader {
                inner: BufReader::with_capacity(READ_BUFFER_SIZE, read),
                buf: Vec::with_capacity(READ_BUFFER_SIZE),
            },
        }
    }

    /// Split into the shared writer and the reader.
    #[must_use]
    pub fn split(self) -> (SessionWriter, SessionReader) {
        (self.writer, self.reader)
    }
}

/// Sending half of a session. Sends are serialized by an internal lock.
pub struct SessionWriter {
    inner: Mutex<Option<BoxedWriter>>,
}

impl SessionWriter {
    /// Send one line. The terminator is appended here.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] after [`SessionWriter::close`], or
    /// [`SessionError::Io`] if the write fails.
    pub async fn send(&self, text: &str) -> Result<(), SessionError> {
        let mut guard = self.inner.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(SessionError::Closed);
        };
        let frame = format!("{text}{TERMINATOR}");
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Shut the sending side down. Later calls do nothing.
    pub async fn close(&self) {
        let Some(mut writer) = self.inner.lock().await.take() else {
            return;
        };
        if let Err(e) = writer.shutdown().await {
            tracing::debug!(error = %e, "session shutdown failed");
        }
    }

    /// Whether [`SessionWriter::close`] has run.
    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.is_none()
    }
}

/// Receiving half of a session.
pub struct SessionReader {
    inner: BufReader<BoxedReader>,
    buf: Vec<u8>,
}

impl SessionReader {
    /// Wait for the next full line.
    ///
    /// Returns `Ok(None)` once the server has closed the connection. Invalid
    /// UTF-8 is replaced rather than rejected. A final line without a
    /// terminator is still returned. A line longer than [`MAX_LINE_LEN`] is
    /// skipped up to its terminator and never returned.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the read fails.
    pub async fn receive(&mut self) -> Result<Option<String>, SessionError> {
        self.buf.clear();
        let mut skipping = false;
        loop {
            let available = self.inner.fill_buf().await?;
            if available.is_empty() {
                if skipping || self.buf.is_empty() {
                    return Ok(None);
                }
                break;
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let content = &available[..newline.unwrap_or(available.len())];
            if !skipping {
                if self.buf.len() + content.len() > MAX_LINE_LEN {
                    tracing::warn!(limit = MAX_LINE_LEN, "dropping over-long line");
                    self.buf.clear();
                    skipping = true;
                } else {
                    self.buf.extend_from_slice(content);
                }
            }
            let used = newline.map_or(available.len(), |i| i + 1);
            self.inner.consume(used);

            if newline.is_some() {
                if skipping {
                    skipping = false;
                    continue;
                }
                break;
            }
        }

        let line = String::from_utf8_lossy(&self.buf);
        let line = line.strip_suffix('\r').unwrap_or(&line);
        Ok(Some(line.to_string()))
    }
}
