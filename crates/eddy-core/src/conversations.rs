use std::sync::Arc;

use uuid::Uuid;

use eddy_db::Database;
use eddy_types::models::Conversation;

use crate::error::{CoreError, Result};

/// Hard limit on conversation names, enforced here and by the schema.
const NAME_LIMIT: usize = 100;

#[derive(Clone)]
pub struct Conversations {
    db: Arc<Database>,
}

impl Conversations {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn create(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
    ) -> Result<Conversation> {
        self.create_inner(owner_id, name.trim(), description, None)
    }

    pub fn get(&self, id: Uuid) -> Result<Conversation> {
        let row = self
            .db
            .get_conversation(&id.to_string())?
            .ok_or(CoreError::NotFound("conversation"))?;
        Ok(row.into_conversation()?)
    }

    pub fn list(&self) -> Result<Vec<Conversation>> {
        let rows = self.db.list_conversations()?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.into_conversation()?);
        }
        Ok(out)
    }

    /// Spawns a new conversation seeded from a message. The child is owned
    /// by the requesting user, carries the source body as its description,
    /// and links back through `parent_message_id`. The generated name is
    /// truncated to the 100-character limit on a codepoint boundary.
    pub fn spawn(&self, message_id: i64, user_id: Uuid) -> Result<Conversation> {
        let message = self
            .db
            .get_message(message_id)?
            .ok_or(CoreError::NotFound("message"))?;
        let user = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(CoreError::NotFound("user"))?;

        if message.body.trim().is_empty() {
            return Err(CoreError::Validation("source message body is empty".into()));
        }

        let name = truncate_chars(
            &format!("{} spawned from: {}", user.login, message.body),
            NAME_LIMIT,
        );
        self.create_inner(user_id, &name, Some(&message.body), Some(message_id))
    }

    fn create_inner(
        &self,
        owner_id: Uuid,
        name: &str,
        description: Option<&str>,
        parent_message_id: Option<i64>,
    ) -> Result<Conversation> {
        if name.is_empty() {
            return Err(CoreError::Validation("conversation name must not be empty".into()));
        }
        if name.chars().count() > NAME_LIMIT {
            return Err(CoreError::Validation(format!(
                "conversation name exceeds {NAME_LIMIT} characters"
            )));
        }
        if self.db.get_user_by_id(&owner_id.to_string())?.is_none() {
            return Err(CoreError::NotFound("user"));
        }

        let id = Uuid::new_v4();
        let row = self.db.create_conversation(
            &id.to_string(),
            &owner_id.to_string(),
            name,
            description,
            parent_message_id,
        )?;
        Ok(row.into_conversation()?)
    }
}

/// Prefix of at most `max` codepoints, never sliced mid-encoding.
fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Database>, Conversations, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "ana", "hash").unwrap();
        let conversations = Conversations::new(db.clone());
        (db, conversations, user_id)
    }

    fn seed_message(db: &Database, author: Uuid, body: &str) -> i64 {
        let convo_id = Uuid::new_v4();
        db.create_conversation(&convo_id.to_string(), &author.to_string(), "origin", None, None)
            .unwrap();
        db.insert_message(&convo_id.to_string(), &author.to_string(), body, None)
            .unwrap()
            .id
    }

    #[test]
    fn create_rejects_empty_and_oversized_names() {
        let (_db, conversations, user_id) = setup();

        let err = conversations.create(user_id, "  ", None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let long = "x".repeat(101);
        let err = conversations.create(user_id, &long, None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        let exact = "x".repeat(100);
        conversations.create(user_id, &exact, None).unwrap();
    }

    #[test]
    fn spawn_links_parent_and_carries_the_body() {
        let (db, conversations, user_id) = setup();
        let message_id = seed_message(&db, user_id, "worth its own thread");

        let child = conversations.spawn(message_id, user_id).unwrap();

        assert_eq!(child.owner_id, user_id);
        assert_eq!(child.parent_message_id, Some(message_id));
        assert_eq!(child.description.as_deref(), Some("worth its own thread"));
        assert_eq!(child.name, "ana spawned from: worth its own thread");
    }

    #[test]
    fn spawn_name_is_capped_at_100_chars_for_multibyte_bodies() {
        let (db, conversations, user_id) = setup();
        let body: String = "🌊é語".repeat(80);
        let message_id = seed_message(&db, user_id, &body);

        let child = conversations.spawn(message_id, user_id).unwrap();

        assert_eq!(child.name.chars().count(), 100);
        assert!(child.name.starts_with("ana spawned from: "));
        // the description keeps the full body
        assert_eq!(child.description.as_deref(), Some(body.as_str()));
    }

    #[test]
    fn spawn_of_missing_message_is_not_found() {
        let (_db, conversations, user_id) = setup();

        let err = conversations.spawn(9999, user_id).unwrap_err();
        assert!(matches!(err, CoreError::NotFound("message")));
    }

    #[test]
    fn spawned_conversations_are_listed() {
        let (db, conversations, user_id) = setup();
        let message_id = seed_message(&db, user_id, "split this off");
        conversations.spawn(message_id, user_id).unwrap();

        let all = conversations.list().unwrap();
        assert!(all.iter().any(|c| c.parent_message_id == Some(message_id)));
    }
}
