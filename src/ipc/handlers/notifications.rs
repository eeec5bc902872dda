use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{fetch_user, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_notifications_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = fetch_user(conn, &user_id) {
        return e.response(&req.id);
    }

    let mut stmt = match conn.prepare(
        "SELECT n.id, n.course_id, c.name, n.comment_id, n.kind, n.message, n.is_read, n.created_at
         FROM notifications n
         JOIN courses c ON c.id = n.course_id
         WHERE n.user_id = ?
         ORDER BY n.created_at DESC, n.rowid DESC",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };

    let rows = stmt
        .query_map([&user_id], |row| {
            let id: String = row.get(0)?;
            let course_id: String = row.get(1)?;
            let course_name: String = row.get(2)?;
            let comment_id: Option<String> = row.get(3)?;
            let kind: String = row.get(4)?;
            let message: String = row.get(5)?;
            let is_read: i64 = row.get(6)?;
            let created_at: String = row.get(7)?;
            Ok(json!({
                "id": id,
                "courseId": course_id,
                "courseName": course_name,
                "commentId": comment_id,
                "kind": kind,
                "message": message,
                "isRead": is_read != 0,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(notifications) => ok(&req.id, json!({ "notifications": notifications })),
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

fn handle_notifications_mark_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let user_id = match required_str(req, "userId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = fetch_user(conn, &user_id) {
        return e.response(&req.id);
    }

    let updated = match optional_str(req, "notificationId") {
        Some(notification_id) => {
            match conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
                (&notification_id, &user_id),
            ) {
                Ok(0) => return err(&req.id, "not_found", "notification not found", None),
                Ok(n) => n,
                Err(e) => return HandlerErr::db("db_update_failed", e).response(&req.id),
            }
        }
        None => match conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
            [&user_id],
        ) {
            Ok(n) => n,
            Err(e) => return HandlerErr::db("db_update_failed", e).response(&req.id),
        },
    };

    ok(&req.id, json!({ "updated": updated }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "notifications.list" => Some(handle_notifications_list(state, req)),
        "notifications.markRead" => Some(handle_notifications_mark_read(state, req)),
        _ => None,
    }
}
