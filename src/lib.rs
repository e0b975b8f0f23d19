//! Prompter Relay - channel-scoped WebSocket relay for remote teleprompters
//!
//! A controller and any number of teleprompters connect to the same channel
//! name; every state-changing message one member sends is forwarded to the
//! rest of the channel. Nothing is persisted.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;

// Re-export main components
pub use config::*;
pub use constants::*;
