//! Core functionality for the relay

pub mod connection;
pub mod dispatcher;
pub mod message;
pub mod outbound;
pub mod presence;
pub mod registry;
pub mod server;
pub mod stats;

// Re-export main components for convenience
pub use connection::{Connection, ConnectionId, ConnectionState};
pub use dispatcher::{DiscardReason, DispatchOutcome, RelayDispatcher};
pub use message::{ClientMessage, Envelope, Inbound, Role, ServerMessage};
pub use presence::PresenceNotifier;
pub use registry::{ChannelRegistry, Departure, JoinOutcome};
pub use server::{create_relay_server, RelayServer, SharedRelayServer};
pub use stats::RelayStats;
