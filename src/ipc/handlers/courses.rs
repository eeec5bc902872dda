use crate::ipc::error::{err, ok, HandlerErr};
use crate::ipc::helpers::{
    fetch_course, fetch_user, is_unique_violation, now_ts, required_str,
};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_courses_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let teacher_id = match required_str(req, "teacherId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    let teacher = match fetch_user(conn, &teacher_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if teacher.role != "teacher" {
        return err(
            &req.id,
            "bad_params",
            "teacherId must reference a teacher",
            Some(json!({ "role": teacher.role })),
        );
    }

    let course_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO courses(id, name, teacher_id) VALUES(?, ?, ?)",
        (&course_id, &name, &teacher_id),
    ) {
        return HandlerErr::db("db_insert_failed", e).response(&req.id);
    }

    ok(
        &req.id,
        json!({ "courseId": course_id, "name": name, "teacherId": teacher_id }),
    )
}

fn handle_courses_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "courses": [] }));
    };

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = match conn.prepare(
        "SELECT
           c.id,
           c.name,
           c.teacher_id,
           u.name AS teacher_name,
           (SELECT COUNT(*) FROM enrollments e WHERE e.course_id = c.id) AS student_count,
           (SELECT COUNT(*) FROM comments cm
              WHERE cm.course_id = c.id AND cm.deleted_at IS NULL) AS comment_count
         FROM courses c
         JOIN users u ON u.id = c.teacher_id
         ORDER BY c.name",
    ) {
        Ok(s) => s,
        Err(e) => return HandlerErr::db("db_query_failed", e).response(&req.id),
    };

    let rows = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let teacher_id: String = row.get(2)?;
            let teacher_name: String = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let comment_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
                "studentCount": student_count,
                "commentCount": comment_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(courses) => ok(&req.id, json!({ "courses": courses })),
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

fn handle_courses_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };

    let course_id = match required_str(req, "courseId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    let student_id = match required_str(req, "studentId") {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };

    if let Err(e) = fetch_course(conn, &course_id) {
        return e.response(&req.id);
    }
    let student = match fetch_user(conn, &student_id) {
        Ok(v) => v,
        Err(e) => return e.response(&req.id),
    };
    if student.role != "student" {
        return err(
            &req.id,
            "bad_params",
            "only students can be enrolled",
            Some(json!({ "role": student.role })),
        );
    }

    if let Err(e) = conn.execute(
        "INSERT INTO enrollments(course_id, student_id, enrolled_at) VALUES(?, ?, ?)",
        (&course_id, &student_id, &now_ts()),
    ) {
        if is_unique_violation(&e) {
            return err(
                &req.id,
                "conflict",
                "student is already enrolled in this course",
                None,
            );
        }
        return HandlerErr::db("db_insert_failed", e).response(&req.id);
    }

    ok(
        &req.id,
        json!({ "courseId": course_id, "studentId": student_id }),
    )
}

fn handle_courses_comments_count(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let counts = conn.query_row(
        "SELECT COUNT(*), COUNT(DISTINCT user_id)
         FROM comments
         WHERE course_id = ? AND deleted_at IS NULL",
        [&course_id],
        |row| {
            let total: i64 = row.get(0)?;
            let unique: i64 = row.get(1)?;
            Ok((total, unique))
        },
    );

    match counts {
        Ok((total, unique)) => ok(
            &req.id,
            json!({ "totalComments": total, "uniqueUsers": unique }),
        ),
        Err(e) => HandlerErr::db("db_query_failed", e).response(&req.id),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "courses.create" => Some(handle_courses_create(state, req)),
        "courses.list" => Some(handle_courses_list(state, req)),
        "courses.enroll" => Some(handle_courses_enroll(state, req)),
        "courses.commentsCount" => Some(handle_courses_comments_count(state, req)),
        _ => None,
    }
}
