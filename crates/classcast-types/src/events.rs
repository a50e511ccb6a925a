use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::Role;
use crate::models::{MessageKind, MessageStatus, Priority};

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, name: String, role: Role },

    /// A message was dispatched; admin lists refresh without a reload
    MessageCreate {
        id: Uuid,
        sender_id: Uuid,
        kind: MessageKind,
        title: String,
        status: MessageStatus,
        recipient_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A message's content, schedule, or audience changed
    MessageUpdate {
        id: Uuid,
        sender_id: Uuid,
        status: MessageStatus,
        recipient_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// A message and its receipts were removed
    MessageDelete { id: Uuid, sender_id: Uuid },

    /// A recipient marked a message read (targeted at the sender so their
    /// read-count ticks live)
    ReceiptRead {
        message_id: Uuid,
        student_id: Uuid,
        read_count: usize,
        total: usize,
        percentage: u32,
    },

    /// Targeted at a recipient: something new (or newly relevant) landed in
    /// their inbox
    InboxUpdate {
        message_id: Uuid,
        sender_name: String,
        kind: MessageKind,
        title: String,
        priority: Priority,
    },

    /// A user connected to or disconnected from the gateway
    PresenceUpdate { user_id: Uuid, name: String, online: bool },
}

impl GatewayEvent {
    /// Broadcast events that only admin portals should receive. Targeted
    /// events (`ReceiptRead`, `InboxUpdate`) never pass through the
    /// broadcast filter, so they are not listed here.
    pub fn admin_only(&self) -> bool {
        matches!(
            self,
            Self::MessageCreate { .. } | Self::MessageUpdate { .. } | Self::MessageDelete { .. }
        )
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_events_are_admin_only() {
        let event = GatewayEvent::MessageDelete {
            id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
        };
        assert!(event.admin_only());

        let presence = GatewayEvent::PresenceUpdate {
            user_id: Uuid::new_v4(),
            name: "Ada".into(),
            online: true,
        };
        assert!(!presence.admin_only());
    }

    #[test]
    fn events_serialize_with_type_and_data_envelope() {
        let event = GatewayEvent::MessageDelete {
            id: Uuid::nil(),
            sender_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "MessageDelete");
        assert!(json["data"]["id"].is_string());
    }
}
