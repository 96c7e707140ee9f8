//! Line protocol spoken between players and the server
//!
//! Every message is a single UTF-8 line. Clients send `NICK:`, `MOVE:`,
//! `REMATCH` and `EXIT`; the server answers with the events in
//! [`ServerEvent`].

use std::fmt;
use std::str::FromStr;

use crate::core::board::Mark;
use crate::error::{Result, RustyCaroError};

/// Client-to-server commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand {
    /// Handshake, first line only
    Nick(String),
    /// Place own mark at column x, row y
    Move { x: i64, y: i64 },
    /// Start a new match after the current one finished
    Rematch,
    /// Leave the match or the wait queue
    Exit,
}

/// Decode one line received from a client
pub fn decode_command(line: &str) -> Result<ClientCommand> {
    let line = line.trim();

    if let Some(name) = line.strip_prefix("NICK:") {
        return Ok(ClientCommand::Nick(name.trim().to_string()));
    }

    if let Some(args) = line.strip_prefix("MOVE:") {
        let (x, y) = args
            .split_once(',')
            .ok_or_else(|| RustyCaroError::MalformedCommand(line.to_string()))?;
        let parse = |v: &str| {
            v.trim()
                .parse::<i64>()
                .map_err(|_| RustyCaroError::MalformedCommand(line.to_string()))
        };
        return Ok(ClientCommand::Move {
            x: parse(x)?,
            y: parse(y)?,
        });
    }

    match line {
        "REMATCH" => Ok(ClientCommand::Rematch),
        "EXIT" => Ok(ClientCommand::Exit),
        _ => Err(RustyCaroError::MalformedCommand(line.to_string())),
    }
}

impl fmt::Display for ClientCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nick(name) => write!(f, "NICK:{}", name),
            Self::Move { x, y } => write!(f, "MOVE:{},{}", x, y),
            Self::Rematch => write!(f, "REMATCH"),
            Self::Exit => write!(f, "EXIT"),
        }
    }
}

impl FromStr for ClientCommand {
    type Err = RustyCaroError;

    fn from_str(s: &str) -> Result<Self> {
        decode_command(s)
    }
}

/// Server-to-client events
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Assigned mark
    Role(Mark),
    /// Opponent nickname
    Opponent(String),
    /// New match on a size x size board
    Start { size: usize },
    /// A cell was placed
    Board { x: usize, y: usize, mark: Mark },
    /// Whose turn is next
    Turn(Mark),
    Win(Mark),
    Draw,
    /// Informational or error text, never fatal by itself
    Info(String),
    /// The opponent exited or disconnected and the room is closed
    OpponentLeft,
}

impl ServerEvent {
    pub fn info(text: impl Into<String>) -> Self {
        Self::Info(text.into())
    }
}

impl fmt::Display for ServerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Role(mark) => write!(f, "ROLE:{}", mark),
            Self::Opponent(name) => write!(f, "OPPONENT:{}", single_line(name)),
            Self::Start { size } => write!(f, "START:SIZE={}", size),
            Self::Board { x, y, mark } => write!(f, "BOARD:{},{},{}", x, y, mark),
            Self::Turn(mark) => write!(f, "TURN:{}", mark),
            Self::Win(mark) => write!(f, "WIN:{}", mark),
            Self::Draw => write!(f, "DRAW"),
            Self::Info(text) => write!(f, "INFO:{}", single_line(text)),
            Self::OpponentLeft => write!(f, "OPPONENT_LEFT"),
        }
    }
}

impl FromStr for ServerEvent {
    type Err = RustyCaroError;

    fn from_str(s: &str) -> Result<Self> {
        let line = s.trim_end_matches(['\r', '\n']);
        let malformed = || RustyCaroError::MalformedCommand(line.to_string());

        match line {
            "DRAW" => return Ok(Self::Draw),
            "OPPONENT_LEFT" => return Ok(Self::OpponentLeft),
            _ => {}
        }

        let (tag, body) = line.split_once(':').ok_or_else(malformed)?;
        match tag {
            "ROLE" => Ok(Self::Role(body.parse()?)),
            "OPPONENT" => Ok(Self::Opponent(body.to_string())),
            "START" => {
                let size = body
                    .strip_prefix("SIZE=")
                    .and_then(|n| n.parse().ok())
                    .ok_or_else(malformed)?;
                Ok(Self::Start { size })
            }
            "BOARD" => {
                let mut parts = body.splitn(3, ',');
                let x = parts.next().and_then(|v| v.parse().ok()).ok_or_else(malformed)?;
                let y = parts.next().and_then(|v| v.parse().ok()).ok_or_else(malformed)?;
                let mark = parts.next().ok_or_else(malformed)?.parse()?;
                Ok(Self::Board { x, y, mark })
            }
            "TURN" => Ok(Self::Turn(body.parse()?)),
            "WIN" => Ok(Self::Win(body.parse()?)),
            "INFO" => Ok(Self::Info(body.to_string())),
            _ => Err(malformed()),
        }
    }
}

// A stray newline would split one event into two on the wire
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
