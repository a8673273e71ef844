//! Ports to the user and group directories, plus a SQLite-backed
//! implementation over the local directory tables.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::Result;
use postbox_db::{Database, directory};
use postbox_types::models::{GroupId, UserId};

pub trait UserDirectory: Send + Sync {
    fn resolve_user(&self, nickname: &str) -> Result<Option<UserId>>;
    fn user_exists(&self, id: UserId) -> Result<bool>;
    fn is_exempt_from_quota(&self, id: UserId) -> Result<bool>;
    fn nickname_of(&self, id: UserId) -> Result<Option<String>>;
}

/// Membership may change at any time; every call is a fresh snapshot.
pub trait GroupDirectory: Send + Sync {
    fn resolve_group(&self, name: &str) -> Result<Option<GroupId>>;
    fn members_of(&self, group: GroupId) -> Result<Vec<UserId>>;
}

/// Read-through access to both directories. Holds no state of its own.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserDirectory>,
    groups: Arc<dyn GroupDirectory>,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserDirectory>, groups: Arc<dyn GroupDirectory>) -> Self {
        Self { users, groups }
    }

    pub fn resolve_user(&self, nickname: &str) -> Result<Option<UserId>> {
        self.users.resolve_user(nickname)
    }

    pub fn resolve_group(&self, name: &str) -> Result<Option<GroupId>> {
        self.groups.resolve_group(name)
    }

    pub fn members_of(&self, group: GroupId) -> Result<BTreeSet<UserId>> {
        Ok(self.groups.members_of(group)?.into_iter().collect())
    }

    pub fn users(&self) -> &dyn UserDirectory {
        self.users.as_ref()
    }
}

/// Directory backed by the `users`, `groups`, `group_members` and
/// `user_roles` tables of the postbox database.
pub struct SqlDirectory {
    db: Arc<Database>,
    exempt_roles: Vec<String>,
}

impl SqlDirectory {
    pub fn new(db: Arc<Database>, exempt_roles: Vec<String>) -> Self {
        Self { db, exempt_roles }
    }
}

impl UserDirectory for SqlDirectory {
    fn resolve_user(&self, nickname: &str) -> Result<Option<UserId>> {
        self.db.with_conn(|conn| directory::find_user_by_nickname(conn, nickname))
    }

    fn user_exists(&self, id: UserId) -> Result<bool> {
        self.db.with_conn(|conn| directory::user_exists(conn, id))
    }

    fn is_exempt_from_quota(&self, id: UserId) -> Result<bool> {
        if self.exempt_roles.is_empty() {
            return Ok(false);
        }
        self.db
            .with_conn(|conn| directory::user_has_any_role(conn, id, &self.exempt_roles))
    }

    fn nickname_of(&self, id: UserId) -> Result<Option<String>> {
        self.db.with_conn(|conn| directory::nickname_of(conn, id))
    }
}

impl GroupDirectory for SqlDirectory {
    fn resolve_group(&self, name: &str) -> Result<Option<GroupId>> {
        self.db.with_conn(|conn| directory::find_group_by_name(conn, name))
    }

    fn members_of(&self, group: GroupId) -> Result<Vec<UserId>> {
        self.db.with_conn(|conn| directory::group_members(conn, group))
    }
}
