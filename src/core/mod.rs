//! Core functionality for the caro server

pub mod board;
pub mod connection;
pub mod matchmaker;
pub mod message;
pub mod room;
pub mod server;
pub mod session;

// Re-export main components for convenience
pub use board::{Board, Cell, Mark};
pub use connection::{Connection, SessionId};
pub use matchmaker::{Matchmaker, Pairing, WaitTicket};
pub use message::{decode_command, ClientCommand, ServerEvent};
pub use room::{LeaveReason, Outcome, Room, RoomSnapshot, RoomStatus, Seat};
pub use server::GameServer;
pub use session::{handshake, CommandReader, PlayerSession};
