//! Connection handlers

pub mod session;

pub use session::{handle_tcp_client, run_session, SessionEnd};
