//! Quota Admission Controller.

use std::collections::BTreeSet;

use rusqlite::Connection;
use tracing::warn;

use postbox_db::queries;
use postbox_types::models::UserId;

use crate::Postbox;
use crate::error::Result;

/// Outcome of checking a recipient set against inbox capacity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admission {
    pub admitted: BTreeSet<UserId>,
    /// Informational; not an error for the send as a whole.
    pub quota_exceeded: BTreeSet<UserId>,
}

/// Decide who still has room. Must run on the same transaction as the
/// fan-out that follows it, otherwise two concurrent sends could both see
/// the last free slot.
///
/// `exempt` users are admitted without looking at their count.
pub(crate) fn admit(
    conn: &Connection,
    recipients: &BTreeSet<UserId>,
    exempt: &BTreeSet<UserId>,
    max_per_inbox: u64,
) -> anyhow::Result<Admission> {
    let mut admission = Admission::default();

    for &user in recipients {
        if exempt.contains(&user) {
            admission.admitted.insert(user);
            continue;
        }

        let held = queries::count_entries(conn, user, false)?;
        if held < max_per_inbox {
            admission.admitted.insert(user);
        } else {
            warn!(user_id = %user, held, max_per_inbox, "Inbox full, recipient skipped");
            admission.quota_exceeded.insert(user);
        }
    }

    Ok(admission)
}

impl Postbox {
    /// Ask the user directory which of `users` bypass the quota. Done before
    /// the write transaction opens, since the directory may share the
    /// database connection.
    pub(crate) fn exempt_users(&self, users: &BTreeSet<UserId>) -> Result<BTreeSet<UserId>> {
        let mut exempt = BTreeSet::new();
        for &user in users {
            if self.resolver.users().is_exempt_from_quota(user)? {
                exempt.insert(user);
            }
        }
        Ok(exempt)
    }

    /// Non-exempt users whose inbox is at or above the quota, with their
    /// current entry counts.
    pub fn users_over_quota(&self) -> Result<Vec<(UserId, u64)>> {
        let max = self.config.max_messages_per_inbox;
        let candidates = self
            .db
            .with_conn(|conn| queries::users_with_at_least(conn, max))?;

        let mut over = Vec::new();
        for (user, held) in candidates {
            if !self.resolver.users().is_exempt_from_quota(user)? {
                over.push((user, held));
            }
        }
        Ok(over)
    }
}
