//! Classifies inbound frames and decides where they go
//!
//! The dispatcher is a router, not a validator: slider ranges, script size
//! and role exclusivity are left to the clients. Any peer can put any
//! `type`/payload combination on the channel and it will be forwarded as-is.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::core::connection::Connection;
use crate::core::message::{ClientMessage, Envelope, Inbound, Role};
use crate::core::presence::PresenceNotifier;
use crate::core::registry::ChannelRegistry;
use crate::core::stats::RelayStats;

/// Why a frame went nowhere
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscardReason {
    /// Not JSON, or no string `type`
    Malformed(String),
    /// Sender is not in any channel
    NotJoined,
    /// A `join` that the registry refused
    JoinRejected(String),
}

/// What happened to a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Forwarded verbatim to the other members
    Relayed {
        channel_id: String,
        kind: String,
        recipients: usize,
    },
    /// Answered with a presence push to the whole channel
    PresenceSent { channel_id: String, recipients: usize },
    /// The sender switched channels
    Moved {
        from: Option<String>,
        to: String,
        member_count: usize,
    },
    Discarded(DiscardReason),
}

const JOIN_KIND: &str = "join";
const CONNECTION_INFO_KIND: &str = "request_connection_info";

pub struct RelayDispatcher {
    registry: Arc<ChannelRegistry>,
    presence: Arc<PresenceNotifier>,
    stats: Arc<RelayStats>,
}

impl RelayDispatcher {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        presence: Arc<PresenceNotifier>,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            registry,
            presence,
            stats,
        }
    }

    /// Route one text frame from `sender`
    pub async fn dispatch(&self, sender: &Arc<Connection>, raw: String) -> DispatchOutcome {
        let envelope = match Envelope::parse(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                debug!("Discarding malformed frame from client {}: {}", sender.id, e);
                self.stats.frame_discarded();
                return DispatchOutcome::Discarded(DiscardReason::Malformed(e.to_string()));
            }
        };

        match &envelope.inbound {
            Inbound::Known(ClientMessage::Join { channel, role }) => {
                self.handle_join(sender, channel, *role).await
            }
            // Handshake types are handled by the relay and never forwarded
            Inbound::Passthrough { kind } if kind == JOIN_KIND => {
                warn!("Client {} sent a join without a usable channel", sender.id);
                self.stats.frame_discarded();
                DispatchOutcome::Discarded(DiscardReason::JoinRejected(
                    "join requires a string 'channel'".to_string(),
                ))
            }
            Inbound::Known(ClientMessage::RequestConnectionInfo) => {
                self.presence_request(sender).await
            }
            Inbound::Passthrough { kind } if kind == CONNECTION_INFO_KIND => {
                self.presence_request(sender).await
            }
            Inbound::Known(ClientMessage::Mode { mode }) => {
                if self.registry.set_role(&sender.id, *mode).await {
                    debug!("Client {} declared role {:?}", sender.id, mode);
                }
                self.relay(sender, &envelope).await
            }
            _ => self.relay(sender, &envelope).await,
        }
    }

    async fn presence_request(&self, sender: &Connection) -> DispatchOutcome {
        match self.registry.channel_of(&sender.id).await {
            Some(channel_id) => {
                let recipients = self.presence.notify(&channel_id).await;
                self.stats.presence_sent(recipients);
                DispatchOutcome::PresenceSent {
                    channel_id,
                    recipients,
                }
            }
            None => self.not_joined(sender),
        }
    }

    async fn relay(&self, sender: &Arc<Connection>, envelope: &Envelope) -> DispatchOutcome {
        let channel_id = match self.registry.channel_of(&sender.id).await {
            Some(channel_id) => channel_id,
            None => return self.not_joined(sender),
        };

        let recipients = self
            .registry
            .broadcast(&channel_id, &envelope.raw, Some(&sender.id))
            .await;
        self.stats.frame_relayed();
        debug!(
            "Channel {}: relayed {} from client {} to {} members",
            channel_id,
            envelope.kind(),
            sender.id,
            recipients
        );

        DispatchOutcome::Relayed {
            channel_id,
            kind: envelope.kind().to_string(),
            recipients,
        }
    }

    async fn handle_join(
        &self,
        sender: &Arc<Connection>,
        channel: &str,
        role: Option<Role>,
    ) -> DispatchOutcome {
        match self.registry.join(channel, sender.clone(), role).await {
            Ok(outcome) => {
                let from = outcome.previous.as_ref().map(|p| p.channel_id.clone());
                if outcome.changed {
                    info!(
                        "Client {} moved from {:?} to channel {} ({} members)",
                        sender.id, from, outcome.channel_id, outcome.member_count
                    );
                    if let Some(previous) = &outcome.previous {
                        let notified = self.presence.notify(&previous.channel_id).await;
                        self.stats.presence_sent(notified);
                    }
                    let notified = self.presence.notify(&outcome.channel_id).await;
                    self.stats.presence_sent(notified);
                }
                DispatchOutcome::Moved {
                    from,
                    to: outcome.channel_id,
                    member_count: outcome.member_count,
                }
            }
            Err(e) => {
                warn!("Client {} join refused: {}", sender.id, e);
                self.stats.frame_discarded();
                DispatchOutcome::Discarded(DiscardReason::JoinRejected(e.to_string()))
            }
        }
    }

    fn not_joined(&self, sender: &Connection) -> DispatchOutcome {
        debug!("Client {} sent a frame outside any channel", sender.id);
        self.stats.frame_discarded();
        DispatchOutcome::Discarded(DiscardReason::NotJoined)
    }
}
