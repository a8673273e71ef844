//! SQL for the `messages` and `mailbox_entries` tables.
//!
//! Every function takes a plain `&Connection` so callers can compose several
//! of them inside one transaction (`Transaction` derefs to `Connection`).

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use postbox_types::models::{
    InboxItem, MailboxEntry, MailboxStatus, Message, MessageId, RecipientSpec, UserId,
};

use crate::models::{MailboxRow, MessageRow, inbox_item};

// -- Messages --

/// Store a message together with the recipient set it was resolved to.
pub fn insert_message(conn: &Connection, message: &Message, recipients: &BTreeSet<UserId>) -> Result<()> {
    let row = MessageRow::from_message(message)?;
    conn.execute(
        "INSERT INTO messages (id, sender_id, subject, body, to_nicknames, to_groups, sent_at, scheduled_at, recipients)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            row.id,
            row.sender_id,
            row.subject,
            row.body,
            row.to_nicknames,
            row.to_groups,
            row.sent_at,
            row.scheduled_at,
            serde_json::to_string(recipients)?,
        ],
    )?;
    Ok(())
}

pub fn get_message(conn: &Connection, id: &MessageId) -> Result<Option<Message>> {
    let row = conn
        .query_row(
            "SELECT id, sender_id, subject, body, to_nicknames, to_groups, sent_at, scheduled_at
             FROM messages WHERE id = ?1",
            [id.to_string()],
            |row| {
                Ok(MessageRow {
                    id: row.get(0)?,
                    sender_id: row.get(1)?,
                    subject: row.get(2)?,
                    body: row.get(3)?,
                    to_nicknames: row.get(4)?,
                    to_groups: row.get(5)?,
                    sent_at: row.get(6)?,
                    scheduled_at: row.get(7)?,
                })
            },
        )
        .optional()?;

    row.map(MessageRow::into_message).transpose()
}

pub fn update_recipient_spec(conn: &Connection, id: &MessageId, spec: &RecipientSpec) -> Result<()> {
    conn.execute(
        "UPDATE messages SET to_nicknames = ?1, to_groups = ?2 WHERE id = ?3",
        params![
            serde_json::to_string(&spec.nicknames)?,
            serde_json::to_string(&spec.groups)?,
            id.to_string(),
        ],
    )?;
    Ok(())
}

/// The recipient set materialized when the message was sent (or last
/// edited). `None` if the message does not exist.
pub fn message_recipients(conn: &Connection, id: &MessageId) -> Result<Option<BTreeSet<UserId>>> {
    let raw: Option<String> = conn
        .query_row("SELECT recipients FROM messages WHERE id = ?1", [id.to_string()], |r| r.get(0))
        .optional()?;

    raw.map(|raw| {
        serde_json::from_str::<BTreeSet<UserId>>(&raw).with_context(|| format!("Corrupt recipient set on message '{}'", id))
    })
    .transpose()
}

pub fn set_message_recipients(conn: &Connection, id: &MessageId, recipients: &BTreeSet<UserId>) -> Result<()> {
    conn.execute(
        "UPDATE messages SET recipients = ?1 WHERE id = ?2",
        params![serde_json::to_string(recipients)?, id.to_string()],
    )?;
    Ok(())
}

/// Delete every listed message that no mailbox entry references any more.
///
/// The reference check and the delete are one statement, so a message can
/// never be removed while an entry still points at it, and two callers racing
/// on the same message cannot both delete it.
pub fn delete_unreferenced_messages(conn: &Connection, ids: &[MessageId]) -> Result<usize> {
    let mut stmt = conn.prepare(
        "DELETE FROM messages
         WHERE id = ?1
           AND NOT EXISTS (SELECT 1 FROM mailbox_entries WHERE message_id = messages.id)",
    )?;

    let mut deleted = 0;
    for id in ids {
        deleted += stmt.execute([id.to_string()])?;
    }
    Ok(deleted)
}

pub fn delete_all_unreferenced_messages(conn: &Connection) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM messages
         WHERE NOT EXISTS (SELECT 1 FROM mailbox_entries WHERE message_id = messages.id)",
        [],
    )?;
    Ok(deleted)
}

// -- Mailbox entries --

pub fn insert_entry(
    conn: &Connection,
    user_id: UserId,
    message_id: &MessageId,
    status: MailboxStatus,
) -> Result<()> {
    conn.execute(
        "INSERT INTO mailbox_entries (user_id, message_id, status) VALUES (?1, ?2, ?3)",
        params![user_id.0, message_id.to_string(), status.as_str()],
    )?;
    Ok(())
}

pub fn get_entry(conn: &Connection, user_id: UserId, message_id: &MessageId) -> Result<Option<MailboxEntry>> {
    let row = conn
        .query_row(
            "SELECT user_id, message_id, status FROM mailbox_entries
             WHERE user_id = ?1 AND message_id = ?2",
            params![user_id.0, message_id.to_string()],
            |row| {
                Ok(MailboxRow {
                    user_id: row.get(0)?,
                    message_id: row.get(1)?,
                    status: row.get(2)?,
                })
            },
        )
        .optional()?;

    row.map(MailboxRow::into_entry).transpose()
}

/// Number of entries the user holds. Reminders count unless excluded.
pub fn count_entries(conn: &Connection, user_id: UserId, exclude_reminder: bool) -> Result<u64> {
    let sql = if exclude_reminder {
        "SELECT COUNT(*) FROM mailbox_entries WHERE user_id = ?1 AND status != 'reminder'"
    } else {
        "SELECT COUNT(*) FROM mailbox_entries WHERE user_id = ?1"
    };
    let count: i64 = conn.query_row(sql, [user_id.0], |r| r.get(0))?;
    Ok(count as u64)
}

pub fn count_entries_with_status(conn: &Connection, user_id: UserId, status: MailboxStatus) -> Result<u64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM mailbox_entries WHERE user_id = ?1 AND status = ?2",
        params![user_id.0, status.as_str()],
        |r| r.get(0),
    )?;
    Ok(count as u64)
}

/// Conditional status change; only rows currently in `from` are touched.
pub fn transition_status(
    conn: &Connection,
    user_id: UserId,
    message_id: &MessageId,
    from: MailboxStatus,
    to: MailboxStatus,
) -> Result<usize> {
    let changed = conn.execute(
        "UPDATE mailbox_entries SET status = ?1
         WHERE user_id = ?2 AND message_id = ?3 AND status = ?4",
        params![to.as_str(), user_id.0, message_id.to_string(), from.as_str()],
    )?;
    Ok(changed)
}

/// Flip every due reminder of the user to `new`. Rows already promoted no
/// longer match the predicate, so repeating this is a no-op.
pub fn promote_due_reminders(conn: &Connection, user_id: UserId, now: DateTime<Utc>) -> Result<usize> {
    let promoted = conn.execute(
        "UPDATE mailbox_entries SET status = 'new'
         WHERE user_id = ?1
           AND status = 'reminder'
           AND message_id IN (SELECT id FROM messages WHERE scheduled_at <= ?2)",
        params![user_id.0, now.timestamp_millis()],
    )?;
    Ok(promoted)
}

/// One page of delivered (non-reminder) entries, oldest delivery first.
pub fn list_inbox(conn: &Connection, user_id: UserId, offset: u64, limit: u32) -> Result<Vec<InboxItem>> {
    let mut stmt = conn.prepare(
        "SELECT e.user_id, e.message_id, e.status,
                m.id, m.sender_id, m.subject, m.body, m.to_nicknames, m.to_groups, m.sent_at, m.scheduled_at
         FROM mailbox_entries e
         JOIN messages m ON m.id = e.message_id
         WHERE e.user_id = ?1 AND e.status != 'reminder'
         ORDER BY m.scheduled_at, m.sent_at, m.id
         LIMIT ?2 OFFSET ?3",
    )?;

    let rows = stmt
        .query_map(params![user_id.0, limit, offset as i64], |row| {
            Ok((
                MailboxRow {
                    user_id: row.get(0)?,
                    message_id: row.get(1)?,
                    status: row.get(2)?,
                },
                MessageRow {
                    id: row.get(3)?,
                    sender_id: row.get(4)?,
                    subject: row.get(5)?,
                    body: row.get(6)?,
                    to_nicknames: row.get(7)?,
                    to_groups: row.get(8)?,
                    sent_at: row.get(9)?,
                    scheduled_at: row.get(10)?,
                },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(entry, message)| inbox_item(entry, message))
        .collect()
}

pub fn delete_entry(conn: &Connection, user_id: UserId, message_id: &MessageId) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM mailbox_entries WHERE user_id = ?1 AND message_id = ?2",
        params![user_id.0, message_id.to_string()],
    )?;
    Ok(deleted)
}

/// Bulk delete for one user. Reminders scheduled after `now` survive.
/// Returns the ids of the messages whose entries were removed.
pub fn delete_all_entries(conn: &Connection, user_id: UserId, now: DateTime<Utc>) -> Result<Vec<MessageId>> {
    const PREDICATE: &str = "user_id = ?1
           AND NOT (status = 'reminder'
                    AND message_id IN (SELECT id FROM messages WHERE scheduled_at > ?2))";

    let mut stmt = conn.prepare(&format!(
        "SELECT message_id FROM mailbox_entries WHERE {}",
        PREDICATE
    ))?;
    let ids = stmt
        .query_map(params![user_id.0, now.timestamp_millis()], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    conn.execute(
        &format!("DELETE FROM mailbox_entries WHERE {}", PREDICATE),
        params![user_id.0, now.timestamp_millis()],
    )?;

    parse_message_ids(ids)
}

/// Remove every entry the user holds, reminders included.
pub fn purge_user_entries(conn: &Connection, user_id: UserId) -> Result<Vec<MessageId>> {
    let mut stmt = conn.prepare("SELECT message_id FROM mailbox_entries WHERE user_id = ?1")?;
    let ids = stmt
        .query_map([user_id.0], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    conn.execute("DELETE FROM mailbox_entries WHERE user_id = ?1", [user_id.0])?;

    parse_message_ids(ids)
}

pub fn entry_owners(conn: &Connection) -> Result<Vec<UserId>> {
    let mut stmt = conn.prepare("SELECT DISTINCT user_id FROM mailbox_entries ORDER BY user_id")?;
    let ids = stmt
        .query_map([], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids.into_iter().map(UserId).collect())
}

/// Users holding at least `min` entries, with their counts.
pub fn users_with_at_least(conn: &Connection, min: u64) -> Result<Vec<(UserId, u64)>> {
    let mut stmt = conn.prepare(
        "SELECT user_id, COUNT(*) FROM mailbox_entries
         GROUP BY user_id
         HAVING COUNT(*) >= ?1
         ORDER BY user_id",
    )?;
    let rows = stmt
        .query_map([min as i64], |row| Ok((UserId(row.get(0)?), row.get::<_, i64>(1)? as u64)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn parse_message_ids(ids: Vec<String>) -> Result<Vec<MessageId>> {
    ids.iter()
        .map(|id| id.parse::<MessageId>().map_err(anyhow::Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::create_test_db;
    use chrono::Duration;

    fn message_at(scheduled: DateTime<Utc>) -> Message {
        Message {
            id: MessageId::new(),
            sender_id: Some(UserId(1)),
            subject: "Agenda".into(),
            body: "See attached".into(),
            recipient_spec: RecipientSpec::new(vec!["bob".into()], vec!["editors".into()]),
            sent_at: Utc::now(),
            scheduled_delivery_at: scheduled,
        }
    }

    #[test]
    fn test_message_survives_storage() {
        let (db, _dir) = create_test_db();
        let message = message_at(Utc::now());
        let recipients = BTreeSet::from([UserId(2), UserId(5)]);

        db.with_conn(|conn| insert_message(conn, &message, &recipients)).unwrap();
        let loaded = db.with_conn(|conn| get_message(conn, &message.id)).unwrap().unwrap();

        assert_eq!(loaded.recipient_spec, message.recipient_spec);
        assert_eq!(loaded.subject, "Agenda");
        assert_eq!(
            loaded.scheduled_delivery_at.timestamp_millis(),
            message.scheduled_delivery_at.timestamp_millis()
        );
        assert_eq!(
            db.with_conn(|conn| message_recipients(conn, &message.id)).unwrap(),
            Some(recipients)
        );
    }

    #[test]
    fn test_recipients_can_be_replaced() {
        let (db, _dir) = create_test_db();
        let message = message_at(Utc::now());

        let replaced = db
            .with_conn(|conn| {
                insert_message(conn, &message, &BTreeSet::from([UserId(2)]))?;
                set_message_recipients(conn, &message.id, &BTreeSet::from([UserId(3), UserId(4)]))?;
                message_recipients(conn, &message.id)
            })
            .unwrap();
        assert_eq!(replaced, Some(BTreeSet::from([UserId(3), UserId(4)])));
        assert_eq!(
            db.with_conn(|conn| message_recipients(conn, &MessageId::new())).unwrap(),
            None
        );
    }

    #[test]
    fn test_referenced_message_is_not_deleted() {
        let (db, _dir) = create_test_db();
        let message = message_at(Utc::now());

        db.with_conn(|conn| {
            insert_message(conn, &message, &BTreeSet::new())?;
            insert_entry(conn, UserId(2), &message.id, MailboxStatus::New)
        })
        .unwrap();

        let deleted = db
            .with_conn(|conn| delete_unreferenced_messages(conn, &[message.id]))
            .unwrap();
        assert_eq!(deleted, 0);

        let deleted = db
            .with_conn(|conn| {
                delete_entry(conn, UserId(2), &message.id)?;
                delete_unreferenced_messages(conn, &[message.id])
            })
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(db.with_conn(|conn| get_message(conn, &message.id)).unwrap().is_none());
    }

    #[test]
    fn test_promotion_only_touches_due_reminders() {
        let (db, _dir) = create_test_db();
        let now = Utc::now();
        let due = message_at(now - Duration::minutes(1));
        let pending = message_at(now + Duration::hours(1));

        db.with_conn(|conn| {
            insert_message(conn, &due, &BTreeSet::new())?;
            insert_message(conn, &pending, &BTreeSet::new())?;
            insert_entry(conn, UserId(2), &due.id, MailboxStatus::Reminder)?;
            insert_entry(conn, UserId(2), &pending.id, MailboxStatus::Reminder)
        })
        .unwrap();

        assert_eq!(db.with_conn(|conn| promote_due_reminders(conn, UserId(2), now)).unwrap(), 1);
        assert_eq!(db.with_conn(|conn| promote_due_reminders(conn, UserId(2), now)).unwrap(), 0);

        let entry = db.with_conn(|conn| get_entry(conn, UserId(2), &pending.id)).unwrap().unwrap();
        assert_eq!(entry.status, MailboxStatus::Reminder);
    }

    #[test]
    fn test_delete_all_keeps_future_reminders() {
        let (db, _dir) = create_test_db();
        let now = Utc::now();
        let read = message_at(now - Duration::hours(2));
        let pending = message_at(now + Duration::hours(1));

        db.with_conn(|conn| {
            insert_message(conn, &read, &BTreeSet::new())?;
            insert_message(conn, &pending, &BTreeSet::new())?;
            insert_entry(conn, UserId(2), &read.id, MailboxStatus::Read)?;
            insert_entry(conn, UserId(2), &pending.id, MailboxStatus::Reminder)
        })
        .unwrap();

        let removed = db.with_conn(|conn| delete_all_entries(conn, UserId(2), now)).unwrap();
        assert_eq!(removed, vec![read.id]);
        assert_eq!(db.with_conn(|conn| count_entries(conn, UserId(2), false)).unwrap(), 1);
    }
}
