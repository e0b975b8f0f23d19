// Fundamental configuration constants
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8000;
pub const WS_PATH: &str = "ws";
pub const DEFAULT_STATIC_DIR: &str = "static";

// Outbound queue and socket write limits
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// Liveness
pub const DEFAULT_PING_SECS: u64 = 30;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;

// Lines moved by a scroll control request when none are given
pub const DEFAULT_SCROLL_LINES: u32 = 5;
