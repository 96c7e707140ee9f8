//! Rusty Caro - a two-player 5-in-a-row match server
//!
//! This library provides the matchmaking queue, the per-match game engine
//! and the line-based TCP protocol that connects players to them.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::*;
pub use constants::*;
