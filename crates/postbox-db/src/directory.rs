//! SQL for the local user/group directory tables.

use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use postbox_types::models::{GroupId, UserId};

// -- Users --

pub fn create_user(conn: &Connection, nickname: &str) -> Result<UserId> {
    conn.execute("INSERT INTO users (nickname) VALUES (?1)", [nickname])?;
    Ok(UserId(conn.last_insert_rowid()))
}

pub fn find_user_by_nickname(conn: &Connection, nickname: &str) -> Result<Option<UserId>> {
    let id = conn
        .query_row("SELECT id FROM users WHERE nickname = ?1", [nickname], |r| r.get(0))
        .optional()?;
    Ok(id.map(UserId))
}

pub fn nickname_of(conn: &Connection, id: UserId) -> Result<Option<String>> {
    Ok(conn
        .query_row("SELECT nickname FROM users WHERE id = ?1", [id.0], |r| r.get(0))
        .optional()?)
}

pub fn user_exists(conn: &Connection, id: UserId) -> Result<bool> {
    Ok(nickname_of(conn, id)?.is_some())
}

pub fn grant_role(conn: &Connection, id: UserId, role: &str) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?1, ?2)",
        params![id.0, role],
    )?;
    Ok(())
}

pub fn user_has_any_role(conn: &Connection, id: UserId, roles: &[String]) -> Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM user_roles WHERE user_id = ?1 AND role = ?2")?;
    for role in roles {
        if stmt.exists(params![id.0, role])? {
            return Ok(true);
        }
    }
    Ok(false)
}

// -- Groups --

pub fn create_group(conn: &Connection, name: &str) -> Result<GroupId> {
    conn.execute("INSERT INTO groups (name) VALUES (?1)", [name])?;
    Ok(GroupId(conn.last_insert_rowid()))
}

pub fn add_member(conn: &Connection, group: GroupId, user: UserId) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?1, ?2)",
        params![group.0, user.0],
    )?;
    Ok(())
}

pub fn find_group_by_name(conn: &Connection, name: &str) -> Result<Option<GroupId>> {
    let id = conn
        .query_row("SELECT id FROM groups WHERE name = ?1", [name], |r| r.get(0))
        .optional()?;
    Ok(id.map(GroupId))
}

pub fn group_members(conn: &Connection, group: GroupId) -> Result<Vec<UserId>> {
    let mut stmt =
        conn.prepare("SELECT user_id FROM group_members WHERE group_id = ?1 ORDER BY user_id")?;
    let ids = stmt
        .query_map([group.0], |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids.into_iter().map(UserId).collect())
}
