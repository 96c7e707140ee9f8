//! Server configuration module
//! Handles dynamic configuration parameters for the caro server

use crate::constants::{
    DEFAULT_BOARD_SIZE, DEFAULT_HOST, DEFAULT_MAX_LINE_LENGTH, DEFAULT_PORT, MAX_BOARD_SIZE,
    WIN_LENGTH,
};
use crate::error::{Result, RustyCaroError};
use std::env;
use std::str::FromStr;

/// How many players have to ask for a rematch before a finished match restarts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RematchPolicy {
    /// Either player's REMATCH restarts the match immediately
    #[default]
    SingleSided,
    /// Both players have to send REMATCH
    MutualConsent,
}

impl FromStr for RematchPolicy {
    type Err = RustyCaroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "single" | "single_sided" => Ok(Self::SingleSided),
            "mutual" | "mutual_consent" => Ok(Self::MutualConsent),
            other => Err(RustyCaroError::ConfigError(format!(
                "Unknown rematch policy '{}', expected 'single' or 'mutual'",
                other
            ))),
        }
    }
}

/// What happens to the remaining player when the opponent leaves a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisconnectPolicy {
    /// The survivor's connection is closed along with the room
    #[default]
    Close,
    /// The survivor goes back to the wait queue for a new opponent
    Requeue,
}

impl FromStr for DisconnectPolicy {
    type Err = RustyCaroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "close" => Ok(Self::Close),
            "requeue" => Ok(Self::Requeue),
            other => Err(RustyCaroError::ConfigError(format!(
                "Unknown disconnect policy '{}', expected 'close' or 'requeue'",
                other
            ))),
        }
    }
}

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Side length of the square board used for new rooms
    pub board_size: usize,
    pub rematch_policy: RematchPolicy,
    pub disconnect_policy: DisconnectPolicy,
    /// Longest line accepted from a client, in bytes
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            board_size: DEFAULT_BOARD_SIZE,
            rematch_policy: RematchPolicy::default(),
            disconnect_policy: DisconnectPolicy::default(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
        }
    }
}

impl ServerConfig {
    /// Loopback configuration on an OS-assigned port, for tests
    pub fn for_testing() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// Address string suitable for `TcpListener::bind`
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the board size against the win length
    fn validate_board_size(size: usize) -> Result<()> {
        if size < WIN_LENGTH {
            return Err(RustyCaroError::ConfigError(format!(
                "Board size {} is smaller than the winning line length {}",
                size, WIN_LENGTH
            )));
        }
        if size > MAX_BOARD_SIZE {
            return Err(RustyCaroError::ConfigError(format!(
                "Board size {} exceeds the maximum of {}",
                size, MAX_BOARD_SIZE
            )));
        }
        Ok(())
    }

    /// Load configuration from environment variables if available
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("RUSTY_CARO_HOST").unwrap_or(DEFAULT_HOST.to_string());
        let port = lookup("RUSTY_CARO_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let board_size = lookup("RUSTY_CARO_BOARD_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BOARD_SIZE);

        let max_line_length = lookup("RUSTY_CARO_MAX_LINE_LENGTH")
            .and_then(|l| l.parse().ok())
            .unwrap_or(DEFAULT_MAX_LINE_LENGTH);

        let rematch_policy = match lookup("RUSTY_CARO_REMATCH_POLICY") {
            Some(value) => value.parse()?,
            None => RematchPolicy::default(),
        };

        let disconnect_policy = match lookup("RUSTY_CARO_DISCONNECT_POLICY") {
            Some(value) => value.parse()?,
            None => DisconnectPolicy::default(),
        };

        Self::validate_board_size(board_size)?;

        Ok(Self {
            host,
            port,
            board_size,
            rematch_policy,
            disconnect_policy,
            max_line_length,
        })
    }
}
