use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Set when this conversation was spawned from a message in another
    /// conversation.
    pub parent_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// Message ids come from a single, strictly increasing sequence shared by
/// all conversations. They are assigned once and never reused, which is
/// what lets watchers synchronize incrementally by id alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub conversation_id: Uuid,
    pub author_id: Uuid,
    pub body: String,
    /// Opaque reference to an attachment stored outside the server.
    pub attachment: Option<String>,
    /// Set exactly once when moderation takes the message down; points at
    /// the abuse report that triggered the takedown.
    pub quarantine_report_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A message is visible to listings and watchers only while it has not
    /// been quarantined.
    pub fn is_published(&self) -> bool {
        self.quarantine_report_id.is_none()
    }
}

/// Per-(user, conversation) read state. Created lazily the first time the
/// user posts into the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub last_read_message_id: i64,
}

/// Result of filing an abuse report: whether the message is quarantined
/// as of the call returning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReportOutcome {
    pub quarantined: bool,
}
