//! Relay service that ties the registry, presence and dispatcher together

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

use crate::config::RelayConfig;
use crate::core::connection::Connection;
use crate::core::dispatcher::{DispatchOutcome, RelayDispatcher};
use crate::core::message::ClientMessage;
use crate::core::presence::PresenceNotifier;
use crate::core::registry::{ChannelRegistry, ChannelSummary, Departure};
use crate::core::stats::{RelayStats, StatsSnapshot};
use crate::error::Result;

/// Body of the health endpoint
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub active_channels: usize,
    pub active_connections: usize,
    pub started_at: DateTime<Utc>,
    pub stats: StatsSnapshot,
    pub channels: Vec<ChannelSummary>,
}

/// Public view of one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub channel: String,
    pub connection_count: usize,
}

pub struct RelayServer {
    config: RelayConfig,
    registry: Arc<ChannelRegistry>,
    presence: Arc<PresenceNotifier>,
    dispatcher: RelayDispatcher,
    stats: Arc<RelayStats>,
    started_at: DateTime<Utc>,
}

impl RelayServer {
    /// Create a relay with its own empty registry
    pub fn new(config: RelayConfig) -> Self {
        Self::with_registry(config, Arc::new(ChannelRegistry::new()))
    }

    /// Create a relay around an existing registry
    pub fn with_registry(config: RelayConfig, registry: Arc<ChannelRegistry>) -> Self {
        let presence = Arc::new(PresenceNotifier::new(registry.clone()));
        let stats = Arc::new(RelayStats::new());
        let dispatcher = RelayDispatcher::new(registry.clone(), presence.clone(), stats.clone());

        Self {
            config,
            registry,
            presence,
            dispatcher,
            stats,
            started_at: Utc::now(),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// A fresh connection sized by the configured queue policy
    pub fn new_connection(&self) -> Arc<Connection> {
        Arc::new(Connection::new(
            self.config.queue_capacity,
            self.config.overflow_policy,
        ))
    }

    /// Open the connection, add it to `channel_id` and push presence.
    /// Returns the channel's member count after the join.
    pub async fn connect(&self, connection: &Arc<Connection>, channel_id: &str) -> Result<usize> {
        connection.mark_open();

        let outcome = match self.registry.join(channel_id, connection.clone(), None).await {
            Ok(outcome) => outcome,
            Err(e) => {
                connection.close();
                return Err(e);
            }
        };

        self.stats.connection_accepted();
        info!(
            "Client {} joined channel {} ({} members)",
            connection.id, outcome.channel_id, outcome.member_count
        );

        let notified = self.presence.notify(&outcome.channel_id).await;
        self.stats.presence_sent(notified);

        Ok(outcome.member_count)
    }

    /// Route one inbound text frame
    pub async fn handle_text(&self, connection: &Arc<Connection>, raw: String) -> DispatchOutcome {
        connection.touch();
        self.dispatcher.dispatch(connection, raw).await
    }

    /// Close the connection and remove it from its channel. Safe to call
    /// more than once; only the first call changes membership.
    pub async fn disconnect(&self, connection: &Connection) -> Option<Departure> {
        connection.close();

        let departure = self.registry.leave(&connection.id).await?;
        self.stats.connection_closed();
        info!(
            "Client {} left channel {} ({} remaining, connected {}s)",
            connection.id,
            departure.channel_id,
            departure.remaining,
            connection.connection_duration().num_seconds()
        );

        if departure.remaining > 0 {
            let notified = self.presence.notify(&departure.channel_id).await;
            self.stats.presence_sent(notified);
        }

        Some(departure)
    }

    /// Send a relay-originated control message to every member of a channel
    pub async fn send_control(&self, channel_id: &str, message: &ClientMessage) -> Result<usize> {
        let payload = message.to_json()?;
        let recipients = self.registry.broadcast(channel_id, &payload, None).await;
        self.stats.frame_relayed();
        info!(
            "Control {} sent to {} members of channel {}",
            message.kind(),
            recipients,
            channel_id
        );
        Ok(recipients)
    }

    pub async fn channel_info(&self, channel_id: &str) -> ChannelInfo {
        ChannelInfo {
            channel: channel_id.to_string(),
            connection_count: self.registry.member_count(channel_id).await,
        }
    }

    pub async fn health(&self) -> HealthReport {
        let channels = self.registry.list_channels().await;
        HealthReport {
            status: "healthy",
            active_channels: channels.len(),
            active_connections: channels.iter().map(|c| c.connection_count).sum(),
            started_at: self.started_at,
            stats: self.stats.snapshot(),
            channels,
        }
    }

    /// Close every connection; used on process shutdown
    pub async fn shutdown(&self) {
        let closed = self.registry.close_all().await;
        if closed > 0 {
            warn!("Shutdown closed {} open connections", closed);
        } else {
            info!("Shutdown with no open connections");
        }
    }
}

// Thread-safe relay handle shared across connection tasks
pub type SharedRelayServer = Arc<RelayServer>;

pub fn create_relay_server(config: RelayConfig) -> SharedRelayServer {
    Arc::new(RelayServer::new(config))
}
