use std::error::Error;
use std::fmt;
use std::io;
use std::sync::PoisonError;

/// Broad classes of failure, deciding whether a connection survives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad or missing nickname on the first line; the connection is dropped
    Handshake,
    /// Unparseable input; the sender gets an INFO reply and carries on
    Protocol,
    /// Legal command at the wrong time or place; INFO reply, no state change
    RuleViolation,
    /// Disconnect or failed I/O; treated as an implicit EXIT
    Connection,
    /// Locking, configuration and other server-side problems
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RustyCaroError {
    // Handshake errors
    EmptyNickname,
    MissingNickname(String),

    // Protocol errors
    MalformedCommand(String),
    LineTooLong(usize),

    // Rule violations
    NotYourTurn,
    OutOfBounds { x: i64, y: i64 },
    CellOccupied { x: usize, y: usize },
    MatchNotFinished,
    MatchFinished,
    NotInMatch,

    // Connection errors
    ConnectionError(String),
    ConnectionClosed,
    RoomClosed,

    // Session errors
    SessionLock(String),

    // Configuration errors
    ConfigError(String),

    // System errors
    SystemError(String),
}

impl RustyCaroError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptyNickname | Self::MissingNickname(_) => ErrorCategory::Handshake,
            Self::MalformedCommand(_) | Self::LineTooLong(_) => ErrorCategory::Protocol,
            Self::NotYourTurn
            | Self::OutOfBounds { .. }
            | Self::CellOccupied { .. }
            | Self::MatchNotFinished
            | Self::MatchFinished
            | Self::NotInMatch => ErrorCategory::RuleViolation,
            Self::ConnectionError(_) | Self::ConnectionClosed | Self::RoomClosed => {
                ErrorCategory::Connection
            }
            Self::SessionLock(_) | Self::ConfigError(_) | Self::SystemError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Whether the connection that produced this error has to be closed
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.category(),
            ErrorCategory::Protocol | ErrorCategory::RuleViolation
        )
    }
}

impl fmt::Display for RustyCaroError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyNickname => write!(f, "Nickname must not be empty"),
            Self::MissingNickname(line) => {
                write!(f, "Expected NICK:<name> as the first line, got '{}'", line)
            }
            Self::MalformedCommand(line) => write!(f, "Unrecognized command: '{}'", line),
            Self::LineTooLong(len) => write!(f, "Line too long: {} bytes", len),
            Self::NotYourTurn => write!(f, "Not your turn"),
            Self::OutOfBounds { x, y } => write!(f, "Cell ({}, {}) is outside the board", x, y),
            Self::CellOccupied { x, y } => write!(f, "Cell ({}, {}) is already taken", x, y),
            Self::MatchNotFinished => write!(f, "Match is still in progress"),
            Self::MatchFinished => write!(f, "Match is over, send REMATCH to play again"),
            Self::NotInMatch => write!(f, "Waiting for an opponent"),
            Self::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed unexpectedly"),
            Self::RoomClosed => write!(f, "Room is closed"),
            Self::SessionLock(msg) => write!(f, "Session lock error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
        }
    }
}

impl Error for RustyCaroError {}

impl From<io::Error> for RustyCaroError {
    fn from(err: io::Error) -> Self {
        RustyCaroError::ConnectionError(err.to_string())
    }
}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for RustyCaroError {
    fn from(err: PoisonError<T>) -> Self {
        RustyCaroError::SessionLock(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for RustyCaro
pub type Result<T> = std::result::Result<T, RustyCaroError>;
