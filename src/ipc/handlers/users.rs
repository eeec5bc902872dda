use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{is_unique_violation, now_ts, required_str};
use crate::ipc::types::{AppState, Request};
use crate::moderation::Role;
use serde_json::json;
use uuid::Uuid;

fn handle_users_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let email = match required_str(req, "email") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let role = match required_str(req, "role") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if Role::parse(&role).is_none() {
        return err(
            &req.id,
            "bad_params",
            "role must be one of: admin, teacher, student",
            Some(json!({ "role": role })),
        );
    }

    let user_id = Uuid::new_v4().to_string();
    let created_at = now_ts();
    if let Err(e) = conn.execute(
        "INSERT INTO users(id, name, email, role, created_at) VALUES(?, ?, ?, ?, ?)",
        (&user_id, &name, &email, &role, &created_at),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "conflict",
                "a user with this email already exists",
                Some(json!({ "email": email })),
            );
        }
        return HandlerErr::db("db_insert_failed", e).response(&req.id);
    }

    ok(
        &req.id,
        json!({
            "userId": user_id,
            "name": name,
            "email": email,
            "role": role,
            "createdAt": created_at
        }),
    )
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "users": [] }));
    };

    let mut stmt =
        match conn.prepare("SELECT id, name, email, role, created_at FROM users ORDER BY name") {
            Ok(s) => s,
            Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
        };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let email: String = row.get(2)?;
            let role: String = row.get(3)?;
            let created_at: String = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "email": email,
                "role": role,
                "createdAt": created_at
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.create" => Some(handle_users_create(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        _ => None,
    }
}
