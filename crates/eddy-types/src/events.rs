use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Events sent over the WebSocket gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, login: String },

    /// A watch was established; the poller will report ids above
    /// `last_seen_id` only
    Watching {
        conversation_id: Uuid,
        last_seen_id: i64,
    },

    /// New message ids became visible in a watched conversation, in
    /// ascending order. The client fetches bodies over REST.
    NewMessages {
        conversation_id: Uuid,
        message_ids: Vec<i64>,
    },

    /// Snapshot of a watch's poller state (also the ack for Pause/Resume)
    PollerState {
        conversation_id: Uuid,
        suspended: bool,
        busy: bool,
        last_seen_id: i64,
    },

    /// A conversation was created or spawned
    ConversationCreated {
        conversation_id: Uuid,
        owner_id: Uuid,
        name: String,
        parent_message_id: Option<i64>,
    },

    /// Moderation took a message down; clients should drop it from view
    MessageQuarantined {
        conversation_id: Uuid,
        message_id: i64,
    },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Start polling a conversation for new messages
    Watch { conversation_id: Uuid },

    /// Stop polling a conversation
    Unwatch { conversation_id: Uuid },

    /// Pause a watch's polling ("pause auto-refresh")
    Pause { conversation_id: Uuid },

    /// Resume a paused watch; the next poll runs immediately
    Resume { conversation_id: Uuid },

    /// Ask for a watch's current poller state
    Status { conversation_id: Uuid },
}
