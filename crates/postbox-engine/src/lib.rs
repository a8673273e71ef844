//! Message distribution and mailbox lifecycle engine.
//!
//! Turns a message plus a recipient spec (nicknames and group names) into
//! per-user mailbox entries, enforces inbox quotas, defers scheduled
//! reminders until they are due, and deletes message bodies once no mailbox
//! entry references them.
//!
//! Every public operation lives on [`Postbox`]; the component modules add
//! their operations as separate `impl Postbox` blocks.

pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod gc;
pub mod mailbox;
pub mod notify;
pub mod quota;
pub mod recipients;
pub mod reply;
pub mod scheduler;
pub mod send;

use std::sync::Arc;

use postbox_db::Database;
use rusqlite::Transaction;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use directory::{GroupDirectory, IdentityResolver, SqlDirectory, UserDirectory};
pub use error::{PostboxError, Result, ValidationError};
pub use gc::SweepReport;
pub use notify::{LogNotifier, NotificationDispatcher, NotificationSender};
pub use quota::Admission;
pub use recipients::{RecipientDelta, RecipientSetBuilder};
pub use send::{EditOutcome, SendOutcome};

pub struct Postbox {
    db: Arc<Database>,
    resolver: IdentityResolver,
    notifier: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Postbox {
    /// Engine with the system clock and log-only notifications.
    pub fn new(
        db: Arc<Database>,
        users: Arc<dyn UserDirectory>,
        groups: Arc<dyn GroupDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            resolver: IdentityResolver::new(users, groups),
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSender>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Run `f` in one write transaction, retrying once if the store reports
    /// a conflict.
    fn transact<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn(&Transaction<'_>) -> Result<T>,
    {
        error::retry_on_conflict(op, || self.db.write(&f))
    }
}
