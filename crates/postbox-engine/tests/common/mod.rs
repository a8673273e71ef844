#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use postbox_db::{Database, directory, queries};
use postbox_engine::{Clock, EngineConfig, ManualClock, NotificationSender, Postbox, SqlDirectory};
use postbox_types::events::MessageSummary;
use postbox_types::models::{GroupId, MessageId, UserId};

/// Remembers every notification it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(UserId, MessageSummary)>>,
    pub fail_for: Option<UserId>,
}

impl RecordingNotifier {
    pub fn recipients(&self) -> Vec<UserId> {
        self.sent.lock().unwrap().iter().map(|(u, _)| *u).collect()
    }
}

impl NotificationSender for RecordingNotifier {
    fn notify(&self, recipient: UserId, summary: &MessageSummary) -> Result<()> {
        if self.fail_for == Some(recipient) {
            anyhow::bail!("smtp relay refused connection");
        }
        self.sent.lock().unwrap().push((recipient, summary.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub postbox: Arc<Postbox>,
    pub db: Arc<Database>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    _dir: TempDir,
}

pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

impl Harness {
    pub fn new(max_per_inbox: u64) -> Self {
        Self::with_notifier(max_per_inbox, RecordingNotifier::default())
    }

    pub fn with_notifier(max_per_inbox: u64, notifier: RecordingNotifier) -> Self {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open(&dir.path().join("postbox.db")).unwrap());
        let config = EngineConfig {
            max_messages_per_inbox: max_per_inbox,
            max_body_chars: 200,
            ..EngineConfig::default()
        };
        let sql_directory = Arc::new(SqlDirectory::new(db.clone(), config.quota_exempt_roles.clone()));
        let clock = Arc::new(ManualClock::new(start()));
        let notifier = Arc::new(notifier);

        let postbox = Postbox::new(db.clone(), sql_directory.clone(), sql_directory, config)
            .with_clock(clock.clone())
            .with_notifier(notifier.clone());

        Self {
            postbox: Arc::new(postbox),
            db,
            clock,
            notifier,
            _dir: dir,
        }
    }

    pub fn clock_now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn user(&self, nickname: &str) -> UserId {
        self.db.with_conn(|conn| directory::create_user(conn, nickname)).unwrap()
    }

    pub fn exempt_user(&self, nickname: &str) -> UserId {
        self.db
            .with_conn(|conn| {
                let id = directory::create_user(conn, nickname)?;
                directory::grant_role(conn, id, "superadmin")?;
                Ok(id)
            })
            .unwrap()
    }

    pub fn group(&self, name: &str, members: &[UserId]) -> GroupId {
        self.db
            .with_conn(|conn| {
                let group = directory::create_group(conn, name)?;
                for &member in members {
                    directory::add_member(conn, group, member)?;
                }
                Ok(group)
            })
            .unwrap()
    }

    pub fn message_exists(&self, id: MessageId) -> bool {
        self.db
            .with_conn(|conn| queries::get_message(conn, &id))
            .unwrap()
            .is_some()
    }

    pub fn message_count(&self) -> i64 {
        self.db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
            .unwrap()
    }

    pub fn holders(&self, id: MessageId) -> Vec<UserId> {
        self.db
            .with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id FROM mailbox_entries WHERE message_id = ?1 ORDER BY user_id",
                )?;
                let ids = stmt
                    .query_map([id.to_string()], |row| row.get::<_, i64>(0))?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ids.into_iter().map(UserId).collect())
            })
            .unwrap()
    }

    pub fn join_group(&self, group: GroupId, user: UserId) {
        self.db
            .with_conn(|conn| directory::add_member(conn, group, user))
            .unwrap();
    }

    /// Take `user` out of `group` behind the engine's back.
    pub fn leave_group(&self, group: GroupId, user: UserId) {
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                    [group.0, user.0],
                )?;
                Ok(())
            })
            .unwrap();
    }

    /// Remove a user from the directory; their mailbox is left behind.
    pub fn drop_user(&self, user: UserId) {
        self.db
            .with_conn(|conn| {
                conn.execute("DELETE FROM users WHERE id = ?1", [user.0])?;
                Ok(())
            })
            .unwrap();
    }

    pub fn entry(&self, user: UserId, id: MessageId) -> Option<postbox_types::models::MailboxEntry> {
        self.db.with_conn(|conn| queries::get_entry(conn, user, &id)).unwrap()
    }

    /// Send a plain immediate message from `from` to the given nicknames.
    pub fn send(&self, from: UserId, to: &[&str]) -> MessageId {
        self.postbox
            .create_message(Some(from), &names(to), &[], "Hello", "Body", None)
            .unwrap()
            .message_id
    }
}

pub fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}
