use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

use crate::ipc::error::HandlerErr;
use crate::ipc::types::Request;
use crate::moderation::{Actor, Role};

/// RFC 3339 UTC with milliseconds, so stored timestamps sort lexically.
pub fn now_ts() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn required_str(req: &Request, key: &str) -> Result<String, HandlerErr> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| HandlerErr::bad_params(format!("missing {}", key)))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub name: String,
    pub role: String,
}

pub fn fetch_user(conn: &Connection, user_id: &str) -> Result<UserRow, HandlerErr> {
    conn.query_row(
        "SELECT id, name, role FROM users WHERE id = ?",
        [user_id],
        |row| {
            Ok(UserRow {
                id: row.get(0)?,
                name: row.get(1)?,
                role: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))?
    .ok_or_else(|| HandlerErr::not_found("user not found"))
}

pub fn fetch_actor(conn: &Connection, req: &Request) -> Result<Actor, HandlerErr> {
    let actor_id = required_str(req, "actorId")?;
    let user = fetch_user(conn, &actor_id)?;
    let role = Role::parse(&user.role)
        .ok_or_else(|| HandlerErr::bad_params(format!("unknown role: {}", user.role)))?;
    Ok(Actor { id: user.id, role })
}

#[derive(Debug, Clone)]
pub struct CourseRow {
    pub id: String,
    pub name: String,
    pub teacher_id: String,
}

pub fn fetch_course(conn: &Connection, course_id: &str) -> Result<CourseRow, HandlerErr> {
    conn.query_row(
        "SELECT id, name, teacher_id FROM courses WHERE id = ?",
        [course_id],
        |row| {
            Ok(CourseRow {
                id: row.get(0)?,
                name: row.get(1)?,
                teacher_id: row.get(2)?,
            })
        },
    )
    .optional()
    .map_err(|e| HandlerErr::db("db_query_failed", e))?
    .ok_or_else(|| HandlerErr::not_found("course not found"))
}

pub fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
