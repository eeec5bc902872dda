use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{fetch_course, is_unique_violation, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::week::{self, WeekEntry};
use chrono::NaiveDate;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn parse_date(raw: &str) -> Result<NaiveDate, HandlerErr> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| HandlerErr::bad_params(format!("date must be YYYY-MM-DD, got {}", raw)))
}

fn handle_schedule_week(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let raw_date = match required_str(req, "date") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let date = match parse_date(&raw_date) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let (monday, sunday) = week::week_window(date);
    let monday_s = monday.format("%Y-%m-%d").to_string();
    let sunday_s = sunday.format("%Y-%m-%d").to_string();

    // ISO date strings compare correctly as text.
    let mut stmt = match conn.prepare(
        "SELECT s.id, s.course_id, c.name, s.date, s.period, s.order_index, s.lesson, s.entry_type
         FROM schedule_entries s
         JOIN courses c ON c.id = s.course_id
         WHERE s.date >= ? AND s.date <= ?
         ORDER BY s.date, s.period, s.order_index",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };

    let rows = stmt
        .query_map([&monday_s, &sunday_s], |row| {
            let date_raw: String = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                date_raw,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    let rows = match rows {
        Ok(v) => v,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (id, course_id, course_name, date_raw, period, order_index, lesson, entry_type) in rows {
        // Unparseable dates cannot land in the window query result, but keep
        // the projection total regardless.
        let Ok(entry_date) = NaiveDate::parse_from_str(&date_raw, "%Y-%m-%d") else {
            continue;
        };
        entries.push(WeekEntry {
            id,
            course_id,
            course_name,
            date: entry_date,
            period,
            order_index,
            lesson,
            entry_type,
        });
    }

    ok(
        &req.id,
        json!({
            "weekStart": monday_s,
            "weekEnd": sunday_s,
            "grid": week::project_grid(monday, &entries),
        }),
    )
}

fn handle_schedule_assign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let raw_date = match required_str(req, "date") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let period = match required_str(req, "period") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if let Err(e) = parse_date(&raw_date) {
        return e.response(&req.id);
    }
    if !week::is_valid_period(&period) {
        return err(
            &req.id,
            "bad_params",
            format!("period must be one of: {}", week::PERIODS.join(", ")),
            Some(json!({ "period": period })),
        );
    }

    let order_index = req
        .params
        .get("orderIndex")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    if !(0..week::SLOTS_PER_PERIOD).contains(&order_index) {
        return err(
            &req.id,
            "bad_params",
            "orderIndex must be 0 or 1",
            Some(json!({ "orderIndex": order_index })),
        );
    }

    let lesson = optional_str(req, "lesson");
    let entry_type = optional_str(req, "type").unwrap_or_else(|| "class".to_string());

    let course = match fetch_course(conn, &course_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let entry_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO schedule_entries(id, course_id, date, period, order_index, lesson, entry_type)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (&entry_id, &course_id, &raw_date, &period, order_index, &lesson, &entry_type),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "conflict",
                "slot is already occupied",
                Some(json!({
                    "date": raw_date,
                    "period": period,
                    "orderIndex": order_index
                })),
            );
        }
        return HandlerErr::db("db_insert_failed", e).response(&req.id);
    }

    ok(
        &req.id,
        json!({
            "entry": {
                "id": entry_id,
                "courseId": course_id,
                "courseName": course.name,
                "date": raw_date,
                "period": period,
                "orderIndex": order_index,
                "lesson": lesson,
                "type": entry_type
            }
        }),
    )
}

fn handle_schedule_unassign(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let entry_id = match required_str(req, "entryId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let exists: Option<String> = match conn
        .query_row(
            "SELECT id FROM schedule_entries WHERE id = ?",
            [&entry_id],
            |row| row.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "schedule entry not found", None);
    }

    if let Err(e) = conn.execute("DELETE FROM schedule_entries WHERE id = ?", [&entry_id]) {
        return HandlerErr::db("db_update_failed", e).response(&req.id);
    }

    ok(&req.id, json!({ "entryId": entry_id, "removed": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "schedule.week" => Some(handle_schedule_week(state, req)),
        "schedule.assign" => Some(handle_schedule_assign(state, req)),
        "schedule.unassign" => Some(handle_schedule_unassign(state, req)),
        _ => None,
    }
}
