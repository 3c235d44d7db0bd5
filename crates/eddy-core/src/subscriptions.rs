use std::sync::Arc;

use uuid::Uuid;

use eddy_db::Database;
use eddy_types::models::Subscription;

use crate::error::Result;

/// Per-(user, conversation) read state. Subscriptions are created lazily
/// the first time they are needed and never deleted while the
/// conversation exists.
#[derive(Clone)]
pub struct Subscriptions {
    db: Arc<Database>,
}

impl Subscriptions {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Returns the existing subscription or creates one. Safe under
    /// concurrent first-posts: the store's insert-or-ignore guarantees a
    /// single row and no conflict error escapes to the caller.
    pub fn ensure_subscribed(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Subscription> {
        let row = self
            .db
            .upsert_subscription(&user_id.to_string(), &conversation_id.to_string())?;
        Ok(row.into_subscription()?)
    }

    /// Moves the read position forward to `message_id`. A stale caller
    /// loses silently; the position never regresses.
    pub fn mark_read(&self, user_id: Uuid, conversation_id: Uuid, message_id: i64) -> Result<()> {
        self.db
            .mark_read(&user_id.to_string(), &conversation_id.to_string(), message_id)?;
        Ok(())
    }

    pub fn get(&self, user_id: Uuid, conversation_id: Uuid) -> Result<Option<Subscription>> {
        let row = self
            .db
            .get_subscription(&user_id.to_string(), &conversation_id.to_string())?;
        match row {
            Some(row) => Ok(Some(row.into_subscription()?)),
            None => Ok(None),
        }
    }
}
