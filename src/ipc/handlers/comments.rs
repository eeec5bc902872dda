use crate::fanout::{self, NewComment};
use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    fetch_actor, fetch_course, fetch_user, now_ts, optional_str, required_str, CourseRow,
};
use crate::ipc::types::{AppState, Request};
use crate::moderation::{self, Actor, Role};
use crate::threading::{self, CommentRow};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

/// The columns every comment read needs, joined with the author.
const COMMENT_SELECT: &str = "SELECT c.id, c.course_id, c.user_id, u.name, u.role, c.parent_id,
        c.content, c.is_edited, c.edited_at, c.deleted_at, c.created_at
     FROM comments c
     JOIN users u ON u.id = c.user_id";

fn map_comment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        course_id: row.get(1)?,
        user_id: row.get(2)?,
        author_name: row.get(3)?,
        author_role: row.get(4)?,
        parent_id: row.get(5)?,
        content: row.get(6)?,
        is_edited: row.get::<_, i64>(7)? != 0,
        edited_at: row.get(8)?,
        deleted_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn comment_json(row: &CommentRow) -> serde_json::Value {
    json!({
        "id": row.id,
        "courseId": row.course_id,
        "userId": row.user_id,
        "authorName": row.author_name,
        "authorRole": row.author_role,
        "parentId": row.parent_id,
        "content": row.content,
        "isEdited": row.is_edited,
        "editedAt": row.edited_at,
        "createdAt": row.created_at,
    })
}

fn fetch_comment(conn: &Connection, comment_id: &str) -> Result<CommentRow, HandlerErr> {
    let sql = format!("{} WHERE c.id = ?", COMMENT_SELECT);
    conn.query_row(&sql, [comment_id], |row| map_comment_row(row))
        .optional()
        .map_err(|e| HandlerErr::db("db_query_failed", e))?
        .ok_or_else(|| HandlerErr::not_found("comment not found"))
}

fn handle_comments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = fetch_course(conn, &course_id) {
        return e.response(&req.id);
    }

    // Flat listing contract is newest-first, hiding soft-deleted rows.
    let sql = format!(
        "{} WHERE c.course_id = ? AND c.deleted_at IS NULL
         ORDER BY c.created_at DESC, c.rowid DESC",
        COMMENT_SELECT
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };
    let rows = stmt
        .query_map([&course_id], |row| map_comment_row(row))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(rows) => ok(
            &req.id,
            json!({ "comments": rows.iter().map(comment_json).collect::<Vec<_>>() }),
        ),
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

fn handle_comments_tree(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = fetch_course(conn, &course_id) {
        return e.response(&req.id);
    }

    // The builder wants the complete set, soft-deleted included, oldest first.
    // rowid breaks same-millisecond ties in insertion order.
    let sql = format!(
        "{} WHERE c.course_id = ? ORDER BY c.created_at ASC, c.rowid ASC",
        COMMENT_SELECT
    );
    let mut stmt = match conn.prepare(&sql) {
        Ok(s) => s,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };
    let rows = stmt
        .query_map([&course_id], |row| map_comment_row(row))
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(rows) => {
            let forest = threading::build_tree(&rows);
            match serde_json::to_value(&forest) {
                Ok(tree) => ok(&req.id, json!({ "comments": tree })),
                Err(e) => err(&req.id, "internal", e.to_string(), None),
            }
        }
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

fn handle_comments_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let content = match required_str(req, "content") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let actor_id = match required_str(req, "actorId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let parent_id = optional_str(req, "parentId");

    let actor = match fetch_user(conn, &actor_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let course = match fetch_course(conn, &course_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // A reply's parent must exist and live in the same course. Replying to a
    // soft-deleted parent stays allowed.
    let parent_author_id = match &parent_id {
        None => None,
        Some(pid) => {
            let parent = match fetch_comment(conn, pid) {
                Ok(v) => v,
                Err(e) => return e.response(&req.id),
            };
            if parent.course_id != course_id {
                return err(
                    &req.id,
                    "bad_params",
                    "parent comment belongs to a different course",
                    Some(json!({ "parentId": pid })),
                );
            }
            Some(parent.user_id)
        }
    };

    let comment_id = Uuid::new_v4().to_string();
    let created_at = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO comments(id, course_id, user_id, parent_id, content, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&comment_id, &course_id, &actor_id, &parent_id, &content, &created_at),
    ) {
        return HandlerErr::db("db_insert_failed", e).response(&req.id);
    }

    // Fan-out is best-effort: the comment write already succeeded, so any
    // notification failure is logged and swallowed.
    dispatch_notifications(conn, &actor_id, &actor.name, &course, &comment_id, parent_author_id);

    match fetch_comment(conn, &comment_id) {
        Ok(row) => ok(&req.id, json!({ "comment": comment_json(&row) })),
        Err(e) => e.response(&req.id),
    }
}

fn dispatch_notifications(
    conn: &Connection,
    actor_id: &str,
    actor_name: &str,
    course: &CourseRow,
    comment_id: &str,
    parent_author_id: Option<String>,
) {
    let (recipients, kind, message) = match parent_author_id {
        Some(parent_author) => (
            fanout::recipients(actor_id, NewComment::Reply { parent_author_id: &parent_author }),
            "comment_reply",
            format!("{} replied to your comment in {}", actor_name, course.name),
        ),
        None => {
            let enrolled: Vec<String> = match conn
                .prepare("SELECT student_id FROM enrollments WHERE course_id = ?")
                .and_then(|mut stmt| {
                    stmt.query_map([&course.id], |row| row.get::<_, String>(0))
                        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                }) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping comment fan-out: enrollment query failed");
                    return;
                }
            };
            (
                fanout::recipients(
                    actor_id,
                    NewComment::Root {
                        teacher_id: &course.teacher_id,
                        enrolled_student_ids: &enrolled,
                    },
                ),
                "course_comment",
                format!("{} commented in {}", actor_name, course.name),
            )
        }
    };

    for user_id in recipients {
        let insert = conn.execute(
            "INSERT INTO notifications(id, user_id, course_id, comment_id, kind, message, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &Uuid::new_v4().to_string(),
                &user_id,
                &course.id,
                &comment_id,
                kind,
                &message,
                &now_ts(),
            ),
        );
        if let Err(e) = insert {
            tracing::warn!(error = %e, user_id = %user_id, "notification insert failed");
        }
    }
}

fn load_moderation_subject(
    conn: &Connection,
    req: &Request,
) -> Result<(Actor, CommentRow, CourseRow), HandlerErr> {
    let comment_id = required_str(req, "commentId")?;
    let comment = fetch_comment(conn, &comment_id)?;
    let course = fetch_course(conn, &comment.course_id)?;
    let actor = fetch_actor(conn, req)?;
    Ok((actor, comment, course))
}

fn handle_comments_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let content = match required_str(req, "content") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let (actor, comment, course) = match load_moderation_subject(conn, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    // Content is frozen once soft-deleted, for every role.
    if comment.deleted_at.is_some() {
        return err(&req.id, "conflict", "cannot edit a deleted comment", None);
    }
    if !moderation::can_modify(&actor, &comment.user_id, &course.teacher_id) {
        return err(
            &req.id,
            "forbidden",
            "not allowed to edit this comment",
            None,
        );
    }

    if let Err(e) = conn.execute(
        "UPDATE comments SET content = ?, is_edited = 1, edited_at = ? WHERE id = ?",
        (&content, &now_ts(), &comment.id),
    ) {
        return HandlerErr::db("db_update_failed", e).response(&req.id);
    }

    match fetch_comment(conn, &comment.id) {
        Ok(row) => ok(&req.id, json!({ "comment": comment_json(&row) })),
        Err(e) => e.response(&req.id),
    }
}

fn handle_comments_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let (actor, comment, course) = match load_moderation_subject(conn, req) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if comment.deleted_at.is_some() {
        return err(&req.id, "conflict", "comment is already deleted", None);
    }
    if !moderation::can_modify(&actor, &comment.user_id, &course.teacher_id) {
        return err(
            &req.id,
            "forbidden",
            "not allowed to delete this comment",
            None,
        );
    }

    if actor.role != Role::Admin {
        let live_replies: i64 = match conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE parent_id = ? AND deleted_at IS NULL",
            [&comment.id],
            |row| row.get(0),
        ) {
            Ok(v) => v,
            Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
        };
        if moderation::delete_blocked_by_replies(&actor, live_replies) {
            return err(
                &req.id,
                "conflict",
                "cannot delete a comment that has replies",
                Some(json!({ "replyCount": live_replies })),
            );
        }
    }

    if let Err(e) = conn.execute(
        "UPDATE comments SET deleted_at = ? WHERE id = ?",
        (&now_ts(), &comment.id),
    ) {
        return HandlerErr::db("db_update_failed", e).response(&req.id);
    }

    ok(&req.id, json!({ "commentId": comment.id, "deleted": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "comments.list" => Some(handle_comments_list(state, req)),
        "comments.tree" => Some(handle_comments_tree(state, req)),
        "comments.add" => Some(handle_comments_add(state, req)),
        "comments.update" => Some(handle_comments_update(state, req)),
        "comments.delete" => Some(handle_comments_delete(state, req)),
        _ => None,
    }
}
