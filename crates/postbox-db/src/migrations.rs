use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub const LATEST_VERSION: i64 = 3;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (messages and mailboxes)");
        conn.execute_batch(
            "
            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       INTEGER,
                subject         TEXT NOT NULL,
                body            TEXT NOT NULL,
                to_nicknames    TEXT NOT NULL DEFAULT '[]',
                to_groups       TEXT NOT NULL DEFAULT '[]',
                sent_at         INTEGER NOT NULL,
                scheduled_at    INTEGER NOT NULL
            );

            CREATE INDEX idx_messages_scheduled ON messages(scheduled_at);

            CREATE TABLE mailbox_entries (
                user_id     INTEGER NOT NULL,
                message_id  TEXT NOT NULL REFERENCES messages(id),
                status      TEXT NOT NULL CHECK (status IN ('new', 'read', 'reminder')),
                PRIMARY KEY (user_id, message_id)
            );

            CREATE INDEX idx_mailbox_message ON mailbox_entries(message_id);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        // Local user/group directory. Deployments that keep accounts elsewhere
        // simply leave these tables empty and plug in their own directory.
        info!("Running migration v2 (local directory)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY,
                nickname    TEXT NOT NULL UNIQUE
            );

            CREATE TABLE groups (
                id          INTEGER PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE
            );

            CREATE TABLE group_members (
                group_id    INTEGER NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (group_id, user_id)
            );

            CREATE TABLE user_roles (
                user_id     INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role        TEXT NOT NULL,
                PRIMARY KEY (user_id, role)
            );

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    if version < 3 {
        // Who a message was addressed to, as resolved when it was sent. Rows
        // from before this column start from their current entry holders.
        info!("Running migration v3 (materialized recipients)");
        conn.execute_batch(
            "
            ALTER TABLE messages ADD COLUMN recipients TEXT NOT NULL DEFAULT '[]';

            UPDATE messages SET recipients = (
                SELECT COALESCE(json_group_array(user_id), '[]')
                FROM mailbox_entries WHERE message_id = messages.id
            );

            INSERT INTO schema_version (version) VALUES (3);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
