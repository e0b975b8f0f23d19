//! Pushes channel member counts to every member whenever they change

use log::{debug, error};
use std::sync::Arc;

use crate::core::message::ServerMessage;
use crate::core::registry::ChannelRegistry;

pub struct PresenceNotifier {
    registry: Arc<ChannelRegistry>,
}

impl PresenceNotifier {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self { registry }
    }

    /// Send a `connection_update` with the current count to all members of
    /// the channel, including whoever caused the change. Returns the number
    /// of members notified; an empty channel gets nothing.
    pub async fn notify(&self, channel_id: &str) -> usize {
        let members = self.registry.members(channel_id).await;
        if members.is_empty() {
            debug!("No presence update for empty channel {}", channel_id);
            return 0;
        }

        let update = ServerMessage::ConnectionUpdate {
            connection_count: members.len(),
        };
        let payload = match update.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize connection update: {}", e);
                return 0;
            }
        };

        let notified = members
            .iter()
            .filter(|connection| connection.send_text(&payload))
            .count();
        debug!(
            "Channel {} has {} members, notified {}",
            channel_id,
            members.len(),
            notified
        );
        notified
    }
}
