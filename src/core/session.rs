//! Player sessions: one registered nickname bound to one live connection

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::core::connection::{Connection, SessionId};
use crate::core::message::{decode_command, ClientCommand, ServerEvent};
use crate::error::{Result, RustyCaroError};

/// Server-side representative of one player
#[derive(Debug, Clone)]
pub struct PlayerSession {
    pub id: SessionId,
    pub nickname: String,
    pub connection: Connection,
    pub registered_at: DateTime<Utc>,
}

impl PlayerSession {
    /// Register a nickname for an accepted connection
    pub fn register(nickname: &str, connection: Connection) -> Result<Self> {
        let nickname = nickname.trim();
        if nickname.is_empty() {
            return Err(RustyCaroError::EmptyNickname);
        }

        Ok(Self {
            id: connection.id,
            nickname: nickname.to_string(),
            connection,
            registered_at: Utc::now(),
        })
    }

    /// Send an event to this player
    pub fn send(&self, event: &ServerEvent) -> bool {
        self.connection.send_event(event)
    }

    pub fn is_connected(&self) -> bool {
        !self.connection.is_closed()
    }
}

/// Inbound side of a connection, yielding decoded commands.
///
/// At most `max_line_length` bytes of a line are buffered; the rest of an
/// over-long line is discarded as it arrives. `next_command` is cancel safe,
/// so it can race other futures in `tokio::select!`.
pub struct CommandReader<R> {
    reader: R,
    max_line_length: usize,
    /// Bytes of the current line kept so far, capped at `max_line_length + 1`
    line: Vec<u8>,
    /// Length of the current line including discarded bytes
    pending: usize,
}

enum LineRead {
    Complete(Vec<u8>),
    TooLong(usize),
}

impl<R> CommandReader<R>
where
    R: AsyncBufRead + Unpin,
{
    pub fn new(reader: R, max_line_length: usize) -> Self {
        Self {
            reader,
            max_line_length,
            line: Vec::new(),
            pending: 0,
        }
    }

    /// Next command from the client.
    ///
    /// `None` means the peer closed the connection. Protocol errors (bad
    /// syntax, invalid UTF-8, over-long lines) come back as recoverable
    /// `Err`s; I/O failures as fatal ones.
    pub async fn next_command(&mut self) -> Option<Result<ClientCommand>> {
        let bytes = match self.read_line().await {
            Ok(Some(LineRead::Complete(bytes))) => bytes,
            Ok(Some(LineRead::TooLong(len))) => {
                return Some(Err(RustyCaroError::LineTooLong(len)));
            }
            Ok(None) => return None,
            Err(e) => return Some(Err(e.into())),
        };

        match String::from_utf8(bytes) {
            Ok(line) => Some(decode_command(&line)),
            Err(e) => Some(Err(RustyCaroError::MalformedCommand(
                String::from_utf8_lossy(e.as_bytes()).into_owned(),
            ))),
        }
    }

    // Progress is kept in `self` between awaits, so dropping this future
    // mid-line loses nothing.
    async fn read_line(&mut self) -> io::Result<Option<LineRead>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.pending == 0 {
                    return Ok(None);
                }
                return Ok(Some(self.finish_line()));
            }

            let (consumed, complete) = match available.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (available.len(), false),
            };
            let content = &available[..if complete { consumed - 1 } else { consumed }];

            let room = (self.max_line_length + 1).saturating_sub(self.line.len());
            self.line.extend_from_slice(&content[..content.len().min(room)]);
            self.pending += content.len();
            self.reader.consume(consumed);

            if complete {
                return Ok(Some(self.finish_line()));
            }
        }
    }

    fn finish_line(&mut self) -> LineRead {
        let len = std::mem::take(&mut self.pending);
        let bytes = std::mem::take(&mut self.line);
        if len > self.max_line_length {
            LineRead::TooLong(len)
        } else {
            LineRead::Complete(bytes)
        }
    }
}

/// Wait for the `NICK:` line and register the session.
///
/// A failed handshake is reported to the client with an INFO line; the caller
/// is expected to drop the connection afterwards.
pub async fn handshake<R>(
    reader: &mut CommandReader<R>,
    connection: Connection,
) -> Result<PlayerSession>
where
    R: AsyncBufRead + Unpin,
{
    let result = match reader.next_command().await {
        None => Err(RustyCaroError::ConnectionClosed),
        Some(Ok(ClientCommand::Nick(name))) => PlayerSession::register(&name, connection.clone()),
        Some(Ok(other)) => Err(RustyCaroError::MissingNickname(other.to_string())),
        Some(Err(RustyCaroError::MalformedCommand(line))) => {
            Err(RustyCaroError::MissingNickname(line))
        }
        Some(Err(e)) => Err(e),
    };

    match &result {
        Ok(session) => info!("{} registered as '{}'", session.id, session.nickname),
        Err(e) if !matches!(e.category(), crate::error::ErrorCategory::Connection) => {
            debug!("Handshake failed for {}: {}", connection.id, e);
            connection.send_event(&ServerEvent::info(format!("Invalid nickname: {}", e)));
        }
        Err(_) => {}
    }

    result
}
