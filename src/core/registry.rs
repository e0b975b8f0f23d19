use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use warp::ws::Message as WsMessage;

use crate::core::connection::{Connection, ConnectionId};
use crate::core::message::Role;
use crate::error::{RelayError, Result};

/// A connection currently joined to a channel
#[derive(Clone)]
pub struct Member {
    pub connection: Arc<Connection>,
    /// Informational only; never gates routing
    pub role: Option<Role>,
    pub joined_at: Instant,
}

/// A named, ephemeral group of members
#[derive(Default)]
pub struct Channel {
    pub members: HashMap<ConnectionId, Member>,
}

impl Channel {
    /// Members whose connection has not been closed. A connection closed by
    /// the relay (queue overflow, failed write) stays in `members` until its
    /// handler leaves, but is never counted or sent to.
    pub fn live_members(&self) -> impl Iterator<Item = (&ConnectionId, &Member)> {
        self.members
            .iter()
            .filter(|(_, member)| !member.connection.is_closed())
    }

    pub fn member_count(&self) -> usize {
        self.live_members().count()
    }

    fn count_role(&self, role: Role) -> usize {
        self.live_members()
            .filter(|(_, member)| member.role == Some(role))
            .count()
    }
}

/// A connection's departure from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub channel_id: String,
    /// Members left behind; 0 means the channel was removed
    pub remaining: usize,
}

/// Result of a join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOutcome {
    pub channel_id: String,
    pub member_count: usize,
    /// False when the connection was already a member of this channel
    pub changed: bool,
    /// Set when the join moved the connection out of another channel
    pub previous: Option<Departure>,
}

/// Per-channel summary for the health endpoint
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ChannelSummary {
    pub channel: String,
    pub connection_count: usize,
    pub controllers: usize,
    pub teleprompters: usize,
}

#[derive(Default)]
struct RegistryState {
    channels: HashMap<String, Channel>,
    /// Reverse index: which channel each connection belongs to
    memberships: HashMap<ConnectionId, String>,
}

impl RegistryState {
    fn remove_member(&mut self, connection_id: &ConnectionId) -> Option<Departure> {
        let channel_id = self.memberships.remove(connection_id)?;

        let (remaining, empty) = match self.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.members.remove(connection_id);
                (channel.member_count(), channel.members.is_empty())
            }
            None => {
                log::debug!(
                    "Connection {} mapped to missing channel {}",
                    connection_id,
                    channel_id
                );
                (0, true)
            }
        };

        // Closed members still awaiting their own leave keep the entry alive
        if empty {
            self.channels.remove(&channel_id);
            log::debug!("Channel {} is empty and was removed", channel_id);
        }

        Some(Departure {
            channel_id,
            remaining,
        })
    }
}

/// Maps channel identifiers to their member sets.
///
/// All membership changes take the write lock, so the channel map and the
/// reverse index are always updated together. Broadcasts only hold the read
/// lock long enough to snapshot recipients; sends happen after it is released
/// and never block, since each connection buffers its own outbound frames.
pub struct ChannelRegistry {
    state: RwLock<RegistryState>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Add a connection to a channel, creating the channel if needed. A
    /// connection in another channel is moved out of it first.
    pub async fn join(
        &self,
        channel_id: &str,
        connection: Arc<Connection>,
        role: Option<Role>,
    ) -> Result<JoinOutcome> {
        validate_channel_id(channel_id)?;

        let mut state = self.state.write().await;

        // Checked under the lock so a closed connection never enters a channel
        if connection.is_closed() {
            return Err(RelayError::ConnectionClosed);
        }

        let connection_id = connection.id;

        if state.memberships.get(&connection_id).map(String::as_str) == Some(channel_id) {
            let channel = state
                .channels
                .get_mut(channel_id)
                .ok_or_else(|| RelayError::SystemError(format!(
                    "membership index points at missing channel {}",
                    channel_id
                )))?;
            if let (Some(member), Some(role)) = (channel.members.get_mut(&connection_id), role) {
                member.role = Some(role);
            }
            return Ok(JoinOutcome {
                channel_id: channel_id.to_string(),
                member_count: channel.member_count(),
                changed: false,
                previous: None,
            });
        }

        let previous = state.remove_member(&connection_id);

        let channel = state.channels.entry(channel_id.to_string()).or_default();
        channel.members.insert(
            connection_id,
            Member {
                connection,
                role,
                joined_at: Instant::now(),
            },
        );
        let member_count = channel.member_count();

        state
            .memberships
            .insert(connection_id, channel_id.to_string());

        Ok(JoinOutcome {
            channel_id: channel_id.to_string(),
            member_count,
            changed: true,
            previous,
        })
    }

    /// Remove a connection from its channel. Returns `None` if it was not in
    /// one, so repeated leaves collapse to a single effect.
    pub async fn leave(&self, connection_id: &ConnectionId) -> Option<Departure> {
        self.state.write().await.remove_member(connection_id)
    }

    /// Send `payload` to every member of `channel_id` except `exclude`.
    /// Returns the number of members that accepted the frame.
    pub async fn broadcast(
        &self,
        channel_id: &str,
        payload: &str,
        exclude: Option<&ConnectionId>,
    ) -> usize {
        let recipients: Vec<Arc<Connection>> = {
            let state = self.state.read().await;
            match state.channels.get(channel_id) {
                Some(channel) => channel
                    .live_members()
                    .filter(|(id, _)| Some(*id) != exclude)
                    .map(|(_, member)| member.connection.clone())
                    .collect(),
                None => {
                    log::debug!("Broadcast to channel {} which has no members", channel_id);
                    return 0;
                }
            }
        };

        if recipients.is_empty() {
            return 0;
        }

        let frame = WsMessage::text(payload);
        let mut sent_count = 0;
        for connection in &recipients {
            if connection.send(frame.clone()) {
                log::trace!("Frame queued for client {}", connection.id);
                sent_count += 1;
            }
        }
        sent_count
    }

    /// Current member connections of a channel
    pub async fn members(&self, channel_id: &str) -> Vec<Arc<Connection>> {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .map(|channel| {
                channel
                    .live_members()
                    .map(|(_, member)| member.connection.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn member_count(&self, channel_id: &str) -> usize {
        self.state
            .read()
            .await
            .channels
            .get(channel_id)
            .map(Channel::member_count)
            .unwrap_or(0)
    }

    /// Channel a connection currently belongs to
    pub async fn channel_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.state
            .read()
            .await
            .memberships
            .get(connection_id)
            .cloned()
    }

    /// Record a member's declared role. Returns false if it is not a member.
    pub async fn set_role(&self, connection_id: &ConnectionId, role: Role) -> bool {
        let mut state = self.state.write().await;
        let channel_id = match state.memberships.get(connection_id) {
            Some(channel_id) => channel_id.clone(),
            None => return false,
        };
        match state
            .channels
            .get_mut(&channel_id)
            .and_then(|channel| channel.members.get_mut(connection_id))
        {
            Some(member) => {
                member.role = Some(role);
                true
            }
            None => false,
        }
    }

    pub async fn role_of(&self, connection_id: &ConnectionId) -> Option<Role> {
        let state = self.state.read().await;
        let channel_id = state.memberships.get(connection_id)?;
        state
            .channels
            .get(channel_id)?
            .members
            .get(connection_id)?
            .role
    }

    /// Channels with at least one live member
    pub async fn channel_count(&self) -> usize {
        self.state
            .read()
            .await
            .channels
            .values()
            .filter(|channel| channel.member_count() > 0)
            .count()
    }

    pub async fn connection_count(&self) -> usize {
        self.state
            .read()
            .await
            .channels
            .values()
            .map(Channel::member_count)
            .sum()
    }

    /// Lists all live channels, sorted by name
    pub async fn list_channels(&self) -> Vec<ChannelSummary> {
        let state = self.state.read().await;
        let mut summaries: Vec<ChannelSummary> = state
            .channels
            .iter()
            .filter(|(_, channel)| channel.member_count() > 0)
            .map(|(id, channel)| ChannelSummary {
                channel: id.clone(),
                connection_count: channel.member_count(),
                controllers: channel.count_role(Role::Controller),
                teleprompters: channel.count_role(Role::Teleprompter),
            })
            .collect();
        summaries.sort_by(|a, b| a.channel.cmp(&b.channel));
        summaries
    }

    /// Close every member connection and empty the registry
    pub async fn close_all(&self) -> usize {
        let mut state = self.state.write().await;
        let mut closed = 0;
        for channel in state.channels.values() {
            for member in channel.members.values() {
                if member.connection.close() {
                    closed += 1;
                }
            }
        }
        state.channels.clear();
        state.memberships.clear();
        closed
    }
}

/// Channel identifiers are opaque, but must not be empty
pub fn validate_channel_id(channel_id: &str) -> Result<()> {
    if channel_id.is_empty() {
        return Err(RelayError::InvalidChannel(
            "channel identifier cannot be empty".to_string(),
        ));
    }
    Ok(())
}
