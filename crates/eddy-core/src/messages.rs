use std::sync::Arc;

use uuid::Uuid;

use eddy_db::Database;
use eddy_types::models::Message;

use crate::error::{CoreError, Result};
use crate::subscriptions::Subscriptions;

#[derive(Clone)]
pub struct Messages {
    db: Arc<Database>,
    subscriptions: Subscriptions,
}

impl Messages {
    pub fn new(db: Arc<Database>, subscriptions: Subscriptions) -> Self {
        Self { db, subscriptions }
    }

    /// Posts a message into a conversation. Posting subscribes the author
    /// to the conversation (lazily, first post wins) and marks the new
    /// message as read for them.
    pub fn post(
        &self,
        conversation_id: Uuid,
        author_id: Uuid,
        body: &str,
        attachment: Option<&str>,
    ) -> Result<Message> {
        if body.trim().is_empty() {
            return Err(CoreError::Validation("message body must not be empty".into()));
        }
        if self.db.get_conversation(&conversation_id.to_string())?.is_none() {
            return Err(CoreError::NotFound("conversation"));
        }
        if self.db.get_user_by_id(&author_id.to_string())?.is_none() {
            return Err(CoreError::NotFound("user"));
        }

        let row = self.db.insert_message(
            &conversation_id.to_string(),
            &author_id.to_string(),
            body,
            attachment,
        )?;
        let message = row.into_message()?;

        self.subscriptions.ensure_subscribed(author_id, conversation_id)?;
        self.subscriptions.mark_read(author_id, conversation_id, message.id)?;

        tracing::debug!(message_id = message.id, %conversation_id, "message posted");
        Ok(message)
    }

    /// Fetches a message by id, quarantined or not.
    pub fn get(&self, id: i64) -> Result<Message> {
        let row = self.db.get_message(id)?.ok_or(CoreError::NotFound("message"))?;
        Ok(row.into_message()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Arc<Database>, Messages, Uuid, Uuid) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user_id = Uuid::new_v4();
        let convo_id = Uuid::new_v4();
        db.create_user(&user_id.to_string(), "ana", "hash").unwrap();
        db.create_conversation(&convo_id.to_string(), &user_id.to_string(), "general", None, None)
            .unwrap();
        let messages = Messages::new(db.clone(), Subscriptions::new(db.clone()));
        (db, messages, user_id, convo_id)
    }

    #[test]
    fn post_subscribes_the_author_and_marks_read() {
        let (db, messages, user_id, convo_id) = setup();

        let message = messages.post(convo_id, user_id, "hello", None).unwrap();

        let sub = db
            .get_subscription(&user_id.to_string(), &convo_id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(sub.last_read_message_id, message.id);
    }

    #[test]
    fn post_does_not_regress_read_position_of_existing_subscription() {
        let (db, messages, user_id, convo_id) = setup();

        let first = messages.post(convo_id, user_id, "one", None).unwrap();
        db.mark_read(&user_id.to_string(), &convo_id.to_string(), first.id + 100)
            .unwrap();
        messages.post(convo_id, user_id, "two", None).unwrap();

        let sub = db
            .get_subscription(&user_id.to_string(), &convo_id.to_string())
            .unwrap()
            .unwrap();
        assert_eq!(sub.last_read_message_id, first.id + 100);
    }

    #[test]
    fn empty_body_is_rejected() {
        let (_db, messages, user_id, convo_id) = setup();

        let err = messages.post(convo_id, user_id, "   ", None).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let (_db, messages, user_id, _convo_id) = setup();

        let err = messages.post(Uuid::new_v4(), user_id, "hello", None).unwrap_err();
        assert!(matches!(err, CoreError::NotFound("conversation")));
    }

    #[test]
    fn unknown_author_is_not_found() {
        let (_db, messages, _user_id, convo_id) = setup();

        let err = messages.post(convo_id, Uuid::new_v4(), "hello", None).unwrap_err();
        assert!(matches!(err, CoreError::NotFound("user")));
    }
}
