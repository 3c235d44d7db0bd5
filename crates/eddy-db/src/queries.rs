use crate::Database;
use crate::models::{ConversationRow, MessageRow, SubscriptionRow, UserRow};
use anyhow::{Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

impl Database {
    // -- Users --

    pub fn create_user(&self, id: &str, login: &str, password_hash: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, login, password) VALUES (?1, ?2, ?3)",
                (id, login, password_hash),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_login(&self, login: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, login, password, created_at FROM users WHERE login = ?1")?;
            let row = stmt.query_row([login], user_from_row).optional()?;
            Ok(row)
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, login, password, created_at FROM users WHERE id = ?1")?;
            let row = stmt.query_row([id], user_from_row).optional()?;
            Ok(row)
        })
    }

    // -- Conversations --

    pub fn create_conversation(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        description: Option<&str>,
        parent_message_id: Option<i64>,
    ) -> Result<ConversationRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO conversations (id, owner_id, name, description, parent_message_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, owner_id, name, description, parent_message_id],
            )?;
            query_conversation(conn, id)?.ok_or_else(|| anyhow!("conversation missing after insert"))
        })
    }

    pub fn get_conversation(&self, id: &str) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| query_conversation(conn, id))
    }

    pub fn list_conversations(&self) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, name, description, parent_message_id, created_at
                 FROM conversations ORDER BY created_at DESC, id",
            )?;
            let rows = stmt
                .query_map([], conversation_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Inserts a message and returns the stored row. The id comes from the
    /// autoincrement sequence, so insertion order is id order.
    pub fn insert_message(
        &self,
        conversation_id: &str,
        author_id: &str,
        body: &str,
        attachment: Option<&str>,
    ) -> Result<MessageRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (conversation_id, author_id, body, attachment)
                 VALUES (?1, ?2, ?3, ?4)",
                params![conversation_id, author_id, body, attachment],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or_else(|| anyhow!("message missing after insert"))
        })
    }

    /// Fetches a message by id regardless of quarantine state.
    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Published messages of a conversation with id cursors: `after` pages
    /// forward in ascending order, `before` pages backward in descending
    /// order, neither returns the latest page (descending). `after` wins
    /// when both are given.
    pub fn get_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        after: Option<i64>,
        before: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        const BASE: &str = "SELECT m.id, m.conversation_id, m.author_id, u.login, m.body,
                    m.attachment, m.quarantine_report_id, m.created_at
             FROM messages m JOIN users u ON u.id = m.author_id
             WHERE m.conversation_id = ?1 AND m.quarantine_report_id IS NULL";

        self.with_conn(|conn| {
            let rows = match (after, before) {
                (Some(after), _) => {
                    let sql = format!("{BASE} AND m.id > ?2 ORDER BY m.id ASC LIMIT ?3");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![conversation_id, after, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                (None, Some(before)) => {
                    let sql = format!("{BASE} AND m.id < ?2 ORDER BY m.id DESC LIMIT ?3");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![conversation_id, before, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                (None, None) => {
                    let sql = format!("{BASE} ORDER BY m.id DESC LIMIT ?2");
                    let mut stmt = conn.prepare(&sql)?;
                    stmt.query_map(params![conversation_id, limit], message_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
            };
            Ok(rows)
        })
    }

    // -- Abuse reports --

    /// Ensures the (message, reporter) report exists and returns its id
    /// together with the total number of distinct reporters. Insert and
    /// count run in one transaction: the count the caller decides on can
    /// never miss the caller's own report or a committed concurrent one.
    pub fn record_abuse_report(&self, message_id: i64, reporter_id: &str) -> Result<(i64, u32)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO abuse_reports (message_id, reporter_id) VALUES (?1, ?2)
                 ON CONFLICT(message_id, reporter_id) DO NOTHING",
                params![message_id, reporter_id],
            )?;
            let report_id: i64 = tx.query_row(
                "SELECT id FROM abuse_reports WHERE message_id = ?1 AND reporter_id = ?2",
                params![message_id, reporter_id],
                |row| row.get(0),
            )?;
            let count: i64 = tx.query_row(
                "SELECT COUNT(*) FROM abuse_reports WHERE message_id = ?1",
                [message_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok((report_id, count as u32))
        })
    }

    /// One-way published -> quarantined transition. The guard on
    /// `quarantine_report_id IS NULL` makes this a compare-and-set: exactly
    /// one caller sees `true`, everyone after that sees `false`.
    pub fn quarantine_message(&self, message_id: i64, report_id: i64) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE messages SET quarantine_report_id = ?1
                 WHERE id = ?2 AND quarantine_report_id IS NULL",
                params![report_id, message_id],
            )?;
            Ok(updated == 1)
        })
    }

    // -- Subscriptions --

    /// Insert-or-ignore on the (user, conversation) key, then re-select.
    /// Concurrent first-posts race on the insert; both see the same row.
    pub fn upsert_subscription(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<SubscriptionRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO subscriptions (user_id, conversation_id) VALUES (?1, ?2)
                 ON CONFLICT(user_id, conversation_id) DO NOTHING",
                (user_id, conversation_id),
            )?;
            query_subscription(conn, user_id, conversation_id)?
                .ok_or_else(|| anyhow!("subscription missing after upsert"))
        })
    }

    pub fn get_subscription(
        &self,
        user_id: &str,
        conversation_id: &str,
    ) -> Result<Option<SubscriptionRow>> {
        self.with_conn(|conn| query_subscription(conn, user_id, conversation_id))
    }

    /// Advances `last_read_message_id`, never regressing it. Returns
    /// whether the stored value moved.
    pub fn mark_read(
        &self,
        user_id: &str,
        conversation_id: &str,
        message_id: i64,
    ) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let updated = conn.execute(
                "UPDATE subscriptions SET last_read_message_id = ?3
                 WHERE user_id = ?1 AND conversation_id = ?2 AND last_read_message_id < ?3",
                params![user_id, conversation_id, message_id],
            )?;
            Ok(updated == 1)
        })
    }

    // -- Sequence feed --

    /// Highest published message id in the conversation, 0 when empty.
    pub fn max_published_id(&self, conversation_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let max: i64 = conn.query_row(
                "SELECT COALESCE(MAX(id), 0) FROM messages
                 WHERE conversation_id = ?1 AND quarantine_report_id IS NULL",
                [conversation_id],
                |row| row.get(0),
            )?;
            Ok(max)
        })
    }

    /// Published ids in `(after, upto]` belonging to the conversation,
    /// ascending. Ids of other conversations in the range are simply
    /// absent; the global sequence interleaves conversations.
    pub fn published_ids_between(
        &self,
        conversation_id: &str,
        after: i64,
        upto: i64,
    ) -> Result<Vec<i64>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM messages
                 WHERE conversation_id = ?1 AND id > ?2 AND id <= ?3
                   AND quarantine_report_id IS NULL
                 ORDER BY id ASC",
            )?;
            let ids = stmt
                .query_map(params![conversation_id, after, upto], |row| row.get(0))?
                .collect::<std::result::Result<Vec<i64>, _>>()?;
            Ok(ids)
        })
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        login: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn query_conversation(conn: &Connection, id: &str) -> Result<Option<ConversationRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, name, description, parent_message_id, created_at
         FROM conversations WHERE id = ?1",
    )?;

    let row = stmt.query_row([id], conversation_from_row).optional()?;
    Ok(row)
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(
        "SELECT m.id, m.conversation_id, m.author_id, u.login, m.body,
                m.attachment, m.quarantine_report_id, m.created_at
         FROM messages m JOIN users u ON u.id = m.author_id
         WHERE m.id = ?1",
    )?;

    let row = stmt.query_row([id], message_from_row).optional()?;
    Ok(row)
}

fn query_subscription(
    conn: &Connection,
    user_id: &str,
    conversation_id: &str,
) -> Result<Option<SubscriptionRow>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, conversation_id, last_read_message_id
         FROM subscriptions WHERE user_id = ?1 AND conversation_id = ?2",
    )?;

    let row = stmt
        .query_row([user_id, conversation_id], |row| {
            Ok(SubscriptionRow {
                user_id: row.get(0)?,
                conversation_id: row.get(1)?,
                last_read_message_id: row.get(2)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn conversation_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ConversationRow> {
    Ok(ConversationRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        parent_message_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        author_id: row.get(2)?,
        author_login: row.get(3)?,
        body: row.get(4)?,
        attachment: row.get(5)?,
        quarantine_report_id: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn test_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn seed_user(db: &Database, login: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_user(&id, login, "hash").unwrap();
        id
    }

    fn seed_conversation(db: &Database, owner_id: &str) -> String {
        let id = Uuid::new_v4().to_string();
        db.create_conversation(&id, owner_id, "test convo", None, None)
            .unwrap();
        id
    }

    #[test]
    fn message_ids_strictly_increase() {
        let db = test_db();
        let user = seed_user(&db, "ana");
        let convo = seed_conversation(&db, &user);

        let a = db.insert_message(&convo, &user, "one", None).unwrap();
        let b = db.insert_message(&convo, &user, "two", None).unwrap();
        let c = db.insert_message(&convo, &user, "three", None).unwrap();

        assert!(a.id < b.id && b.id < c.id);
    }

    #[test]
    fn record_abuse_report_is_idempotent() {
        let db = test_db();
        let author = seed_user(&db, "ana");
        let reporter = seed_user(&db, "bob");
        let convo = seed_conversation(&db, &author);
        let msg = db.insert_message(&convo, &author, "spam", None).unwrap();

        let (first_id, first_count) = db.record_abuse_report(msg.id, &reporter).unwrap();
        let (second_id, second_count) = db.record_abuse_report(msg.id, &reporter).unwrap();

        assert_eq!(first_id, second_id);
        assert_eq!(first_count, 1);
        assert_eq!(second_count, 1);
    }

    #[test]
    fn distinct_reporters_are_counted() {
        let db = test_db();
        let author = seed_user(&db, "ana");
        let convo = seed_conversation(&db, &author);
        let msg = db.insert_message(&convo, &author, "spam", None).unwrap();

        for i in 0..3 {
            let reporter = seed_user(&db, &format!("reporter{i}"));
            let (_, count) = db.record_abuse_report(msg.id, &reporter).unwrap();
            assert_eq!(count, i + 1);
        }
    }

    #[test]
    fn quarantine_transition_wins_once() {
        let db = test_db();
        let author = seed_user(&db, "ana");
        let reporter = seed_user(&db, "bob");
        let convo = seed_conversation(&db, &author);
        let msg = db.insert_message(&convo, &author, "spam", None).unwrap();
        let (report_id, _) = db.record_abuse_report(msg.id, &reporter).unwrap();

        assert!(db.quarantine_message(msg.id, report_id).unwrap());
        assert!(!db.quarantine_message(msg.id, report_id).unwrap());

        let stored = db.get_message(msg.id).unwrap().unwrap();
        assert_eq!(stored.quarantine_report_id, Some(report_id));
    }

    #[test]
    fn quarantined_messages_leave_the_published_scope() {
        let db = test_db();
        let author = seed_user(&db, "ana");
        let reporter = seed_user(&db, "bob");
        let convo = seed_conversation(&db, &author);

        let first = db.insert_message(&convo, &author, "keep", None).unwrap();
        let second = db.insert_message(&convo, &author, "drop", None).unwrap();
        let (report_id, _) = db.record_abuse_report(second.id, &reporter).unwrap();
        db.quarantine_message(second.id, report_id).unwrap();

        assert_eq!(db.max_published_id(&convo).unwrap(), first.id);
        assert_eq!(
            db.published_ids_between(&convo, 0, second.id).unwrap(),
            vec![first.id]
        );
        let listed = db.get_messages(&convo, 50, None, None).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, first.id);
    }

    #[test]
    fn published_ids_skip_other_conversations() {
        let db = test_db();
        let user = seed_user(&db, "ana");
        let convo_a = seed_conversation(&db, &user);
        let convo_b = seed_conversation(&db, &user);

        let a1 = db.insert_message(&convo_a, &user, "a1", None).unwrap();
        let _b = db.insert_message(&convo_b, &user, "b1", None).unwrap();
        let a2 = db.insert_message(&convo_a, &user, "a2", None).unwrap();

        let ids = db.published_ids_between(&convo_a, 0, a2.id).unwrap();
        assert_eq!(ids, vec![a1.id, a2.id]);
    }

    #[test]
    fn subscription_upsert_yields_one_row() {
        let db = test_db();
        let user = seed_user(&db, "ana");
        let convo = seed_conversation(&db, &user);

        db.upsert_subscription(&user, &convo).unwrap();
        db.upsert_subscription(&user, &convo).unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM subscriptions WHERE user_id = ?1 AND conversation_id = ?2",
                    [&user, &convo],
                    |row| row.get(0),
                )?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn mark_read_never_regresses() {
        let db = test_db();
        let user = seed_user(&db, "ana");
        let convo = seed_conversation(&db, &user);
        db.upsert_subscription(&user, &convo).unwrap();

        assert!(db.mark_read(&user, &convo, 5).unwrap());
        assert!(!db.mark_read(&user, &convo, 3).unwrap());
        assert_eq!(
            db.get_subscription(&user, &convo).unwrap().unwrap().last_read_message_id,
            5
        );

        assert!(db.mark_read(&user, &convo, 7).unwrap());
        assert_eq!(
            db.get_subscription(&user, &convo).unwrap().unwrap().last_read_message_id,
            7
        );
    }

    #[test]
    fn message_cursors_page_in_both_directions() {
        let db = test_db();
        let user = seed_user(&db, "ana");
        let convo = seed_conversation(&db, &user);

        let ids: Vec<i64> = (0..5)
            .map(|i| db.insert_message(&convo, &user, &format!("m{i}"), None).unwrap().id)
            .collect();

        let forward = db.get_messages(&convo, 2, Some(ids[1]), None).unwrap();
        assert_eq!(forward.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[3]]);

        let backward = db.get_messages(&convo, 2, None, Some(ids[3])).unwrap();
        assert_eq!(backward.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[2], ids[1]]);

        let latest = db.get_messages(&convo, 2, None, None).unwrap();
        assert_eq!(latest.iter().map(|m| m.id).collect::<Vec<_>>(), vec![ids[4], ids[3]]);
    }
}
