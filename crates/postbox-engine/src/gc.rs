//! Garbage Collector: a message row lives exactly as long as some mailbox
//! entry references it.

use rusqlite::Connection;
use tracing::{debug, info};

use postbox_db::queries;
use postbox_types::models::{MessageId, UserId};

use crate::Postbox;
use crate::error::Result;

/// Delete whichever of `affected` lost their last reference. Call on the
/// same transaction as the entry deletes that made them candidates.
pub(crate) fn collect(conn: &Connection, affected: &[MessageId]) -> anyhow::Result<usize> {
    if affected.is_empty() {
        return Ok(0);
    }
    let deleted = queries::delete_unreferenced_messages(conn, affected)?;
    if deleted > 0 {
        debug!(deleted, candidates = affected.len(), "Collected unreferenced messages");
    }
    Ok(deleted)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Users that no longer exist but still owned entries.
    pub vanished_users: Vec<UserId>,
    pub entries_removed: usize,
    pub messages_deleted: usize,
}

impl Postbox {
    /// Full maintenance pass: drop the mailboxes of users that have left the
    /// directory, then delete every message nobody references.
    pub fn sweep_orphans(&self) -> Result<SweepReport> {
        let owners = self.db.with_conn(queries::entry_owners)?;

        let mut vanished = Vec::new();
        for user in owners {
            if !self.resolver.users().user_exists(user)? {
                vanished.push(user);
            }
        }

        let (entries_removed, messages_deleted) = self.transact("sweep_orphans", |tx| {
            let mut removed = 0;
            for &user in &vanished {
                removed += queries::purge_user_entries(tx, user)?.len();
            }
            let deleted = queries::delete_all_unreferenced_messages(tx)?;
            Ok((removed, deleted))
        })?;

        info!(
            vanished_users = vanished.len(),
            entries_removed, messages_deleted, "Orphan sweep finished"
        );
        Ok(SweepReport {
            vanished_users: vanished,
            entries_removed,
            messages_deleted,
        })
    }
}
