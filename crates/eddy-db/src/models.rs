//! Database row types — these map directly to SQLite rows.
//! Distinct from the eddy-types API models to keep the DB layer
//! independent; `into_*` converts a row into its typed model.

use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};

use eddy_types::models::{Conversation, Message, Subscription, User};

pub struct UserRow {
    pub id: String,
    pub login: String,
    pub password: String,
    pub created_at: String,
}

pub struct ConversationRow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub parent_message_id: Option<i64>,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: String,
    pub author_id: String,
    pub author_login: String,
    pub body: String,
    pub attachment: Option<String>,
    pub quarantine_report_id: Option<i64>,
    pub created_at: String,
}

pub struct SubscriptionRow {
    pub user_id: String,
    pub conversation_id: String,
    pub last_read_message_id: i64,
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: self.id.parse()?,
            login: self.login,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl ConversationRow {
    pub fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            id: self.id.parse()?,
            owner_id: self.owner_id.parse()?,
            name: self.name,
            description: self.description,
            parent_message_id: self.parent_message_id,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl MessageRow {
    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: self.id,
            conversation_id: self.conversation_id.parse()?,
            author_id: self.author_id.parse()?,
            body: self.body,
            attachment: self.attachment,
            quarantine_report_id: self.quarantine_report_id,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl SubscriptionRow {
    pub fn into_subscription(self) -> Result<Subscription> {
        Ok(Subscription {
            user_id: self.user_id.parse()?,
            conversation_id: self.conversation_id.parse()?,
            last_read_message_id: self.last_read_message_id,
        })
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Accept RFC 3339 too so externally written rows keep working.
pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")?;
    Ok(naive.and_utc())
}
