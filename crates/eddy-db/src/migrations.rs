use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            login       TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            owner_id            TEXT NOT NULL REFERENCES users(id),
            name                TEXT NOT NULL CHECK (length(name) <= 100),
            description         TEXT,
            parent_message_id   INTEGER REFERENCES messages(id),
            created_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- AUTOINCREMENT: message ids are strictly increasing and never
        -- reused, even across deletes. Watchers synchronize by id ranges,
        -- so the sequence must never step backwards.
        CREATE TABLE IF NOT EXISTS messages (
            id                      INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id         TEXT NOT NULL REFERENCES conversations(id),
            author_id               TEXT NOT NULL REFERENCES users(id),
            body                    TEXT NOT NULL,
            attachment              TEXT,
            quarantine_report_id    INTEGER REFERENCES abuse_reports(id),
            created_at              TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, id);

        CREATE TABLE IF NOT EXISTS abuse_reports (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER NOT NULL REFERENCES messages(id),
            reporter_id TEXT NOT NULL REFERENCES users(id),
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(message_id, reporter_id)
        );

        CREATE INDEX IF NOT EXISTS idx_abuse_reports_message
            ON abuse_reports(message_id);

        CREATE TABLE IF NOT EXISTS subscriptions (
            user_id                 TEXT NOT NULL REFERENCES users(id),
            conversation_id         TEXT NOT NULL REFERENCES conversations(id),
            last_read_message_id    INTEGER NOT NULL DEFAULT 0,
            created_at              TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY(user_id, conversation_id)
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
