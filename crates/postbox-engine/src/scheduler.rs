//! Delivery Scheduler.
//!
//! There is no timer. Reminders become visible the next time their owner's
//! mailbox is read: every read path calls [`promote_due`] first.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::debug;

use postbox_db::queries;
use postbox_types::models::{MailboxStatus, UserId};

/// Status a fresh mailbox entry starts in.
pub fn initial_status(scheduled_delivery_at: DateTime<Utc>, now: DateTime<Utc>) -> MailboxStatus {
    if scheduled_delivery_at > now {
        MailboxStatus::Reminder
    } else {
        MailboxStatus::New
    }
}

/// Messages store timestamps at millisecond precision; truncate up front so
/// the values handed back to callers match what is persisted.
pub(crate) fn to_stored_precision(at: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or(at)
}

/// Promote every due reminder of `user` to NEW. Idempotent.
pub(crate) fn promote_due(conn: &Connection, user: UserId, now: DateTime<Utc>) -> anyhow::Result<usize> {
    let promoted = queries::promote_due_reminders(conn, user, now)?;
    if promoted > 0 {
        debug!(user_id = %user, promoted, "Promoted due reminders");
    }
    Ok(promoted)
}
