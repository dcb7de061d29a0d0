use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    now_rfc3339, opt_bool, opt_str, require_class, require_db, require_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn require_student(conn: &Connection, student_id: &str) -> Result<String, HandlerErr> {
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    class_id.ok_or_else(|| {
        HandlerErr::with_details("not_found", "student not found", json!({ "studentId": student_id }))
    })
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, last_name, first_name, active, sort_order
             FROM students
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::db)?;
    let students = stmt
        .query_map([class_id], |row| {
            let id: String = row.get(0)?;
            let last: String = row.get(1)?;
            let first: String = row.get(2)?;
            let active: i64 = row.get(3)?;
            let sort_order: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "lastName": last,
                "firstName": first,
                "displayName": format!("{}, {}", last, first),
                "active": active != 0,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(ok(&req.id, json!({ "students": students })))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;
    let last_name = require_str(&req.params, "lastName")?.trim().to_string();
    let first_name = require_str(&req.params, "firstName")?.trim().to_string();
    if last_name.is_empty() || first_name.is_empty() {
        return Err(HandlerErr::new("bad_params", "names must not be empty"));
    }

    let next_sort: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM students WHERE class_id = ?",
            [class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO students(id, class_id, last_name, first_name, active, sort_order, updated_at)
         VALUES(?, ?, ?, ?, 1, ?, ?)",
        (&id, class_id, &last_name, &first_name, next_sort, now_rfc3339()),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(ok(&req.id, json!({ "id": id, "sortOrder": next_sort })))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = require_str(&req.params, "studentId")?;
    require_student(conn, student_id)?;

    if let Some(last) = opt_str(&req.params, "lastName") {
        let last = last.trim();
        if last.is_empty() {
            return Err(HandlerErr::new("bad_params", "lastName must not be empty"));
        }
        conn.execute(
            "UPDATE students SET last_name = ?, updated_at = ? WHERE id = ?",
            (last, now_rfc3339(), student_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(first) = opt_str(&req.params, "firstName") {
        let first = first.trim();
        if first.is_empty() {
            return Err(HandlerErr::new("bad_params", "firstName must not be empty"));
        }
        conn.execute(
            "UPDATE students SET first_name = ?, updated_at = ? WHERE id = ?",
            (first, now_rfc3339(), student_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(active) = opt_bool(&req.params, "active") {
        conn.execute(
            "UPDATE students SET active = ?, updated_at = ? WHERE id = ?",
            (active as i64, now_rfc3339(), student_id),
        )
        .map_err(HandlerErr::db)?;
    }

    Ok(ok(&req.id, json!({ "updated": true })))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let student_id = require_str(&req.params, "studentId")?;
    require_student(conn, student_id)?;

    // The student's grade rows go with them.
    conn.execute("DELETE FROM grades WHERE student_id = ?", [student_id])
        .map_err(HandlerErr::db)?;
    conn.execute("DELETE FROM students WHERE id = ?", [student_id])
        .map_err(HandlerErr::db)?;

    Ok(ok(&req.id, json!({ "deleted": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "students.list" => Some(handle_list(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "students.create" => {
            Some(handle_create(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        "students.update" => {
            Some(handle_update(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        "students.delete" => {
            Some(handle_delete(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        _ => None,
    }
}
