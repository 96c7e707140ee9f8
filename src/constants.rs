// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 5001;

// Game rules
pub const DEFAULT_BOARD_SIZE: usize = 15;
pub const MAX_BOARD_SIZE: usize = 100;
pub const WIN_LENGTH: usize = 5;

// Protocol limits
pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;
