//! Outbound side of a player connection
//! Events are queued on an unbounded channel and written to the socket by a
//! dedicated task, so a sender never waits on a slow client.

use log::{debug, warn};
use std::time::{Duration, Instant};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::core::message::ServerEvent;

/// Unique handle for one live connection
pub type SessionId = Uuid;

/// Sending half of a single client connection
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: SessionId,
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl Connection {
    /// Create a new connection with a unique ID
    pub fn new(sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Create a connection whose events are written to `writer` line by line.
    ///
    /// The writer task ends when every clone of the connection has been
    /// dropped or a write fails; after a failed write `send_event` returns
    /// false.
    pub fn spawn_writer<W>(writer: W) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let connection = Self::new(tx);
        let id = connection.id;

        let handle = tokio::spawn(async move {
            let mut writer = writer;
            while let Some(mut line) = rx.recv().await {
                line.push('\n');
                if let Err(e) = writer.write_all(line.as_bytes()).await {
                    warn!("Failed to write to client {}: {}", id, e);
                    break;
                }
            }
            let _ = writer.shutdown().await;
            debug!("Writer for client {} finished", id);
        });

        (connection, handle)
    }

    /// Queue an event for this client
    pub fn send_event(&self, event: &ServerEvent) -> bool {
        match self.sender.send(event.to_string()) {
            Ok(_) => true,
            Err(_) => {
                warn!("Failed to send '{}' to client {}", event, self.id);
                false
            }
        }
    }

    /// Whether the writer side has gone away
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Calculate the connection duration
    pub fn connection_duration(&self) -> Duration {
        self.connected_at.elapsed()
    }
}
