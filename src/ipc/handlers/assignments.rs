use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{
    now_rfc3339, opt_bool, opt_str, require_class, require_db, require_str,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

pub fn require_assignment(conn: &Connection, assignment_id: &str) -> Result<String, HandlerErr> {
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM assignments WHERE id = ?",
            [assignment_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    class_id.ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "assignment not found",
            json!({ "assignmentId": assignment_id }),
        )
    })
}

fn validate_max_points(max_points: f64) -> Result<(), HandlerErr> {
    if !max_points.is_finite() || max_points <= 0.0 {
        return Err(HandlerErr::with_details(
            "bad_params",
            "maxPoints must be positive",
            json!({ "maxPoints": max_points }),
        ));
    }
    Ok(())
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;

    let mut stmt = conn
        .prepare(
            "SELECT id, title, category, max_points, date, completed, sort_order
             FROM assignments
             WHERE class_id = ?
             ORDER BY sort_order",
        )
        .map_err(HandlerErr::db)?;
    let assignments = stmt
        .query_map([class_id], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let category: Option<String> = row.get(2)?;
            let max_points: f64 = row.get(3)?;
            let date: Option<String> = row.get(4)?;
            let completed: i64 = row.get(5)?;
            let sort_order: i64 = row.get(6)?;
            Ok(json!({
                "id": id,
                "title": title,
                "category": category,
                "maxPoints": max_points,
                "date": date,
                "completed": completed != 0,
                "sortOrder": sort_order
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    Ok(ok(&req.id, json!({ "assignments": assignments })))
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;
    let title = require_str(&req.params, "title")?.trim().to_string();
    if title.is_empty() {
        return Err(HandlerErr::new("bad_params", "title must not be empty"));
    }
    let max_points = req
        .params
        .get("maxPoints")
        .and_then(|v| v.as_f64())
        .unwrap_or(100.0);
    validate_max_points(max_points)?;
    // Stored as given; a blank category resolves to "Homework" at
    // computation time.
    let category = opt_str(&req.params, "category")
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);
    let date = opt_str(&req.params, "date").map(str::to_string);

    let next_sort: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM assignments WHERE class_id = ?",
            [class_id],
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO assignments(id, class_id, title, category, max_points, date, completed, sort_order, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, 0, ?, ?)",
        (
            &id,
            class_id,
            &title,
            &category,
            max_points,
            &date,
            next_sort,
            now_rfc3339(),
        ),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(ok(
        &req.id,
        json!({ "id": id, "category": category, "maxPoints": max_points, "sortOrder": next_sort }),
    ))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = require_str(&req.params, "assignmentId")?;
    require_assignment(conn, assignment_id)?;

    if let Some(title) = opt_str(&req.params, "title") {
        let title = title.trim();
        if title.is_empty() {
            return Err(HandlerErr::new("bad_params", "title must not be empty"));
        }
        conn.execute(
            "UPDATE assignments SET title = ?, updated_at = ? WHERE id = ?",
            (title, now_rfc3339(), assignment_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(category) = opt_str(&req.params, "category") {
        let category = category.trim();
        let stored = if category.is_empty() { None } else { Some(category) };
        conn.execute(
            "UPDATE assignments SET category = ?, updated_at = ? WHERE id = ?",
            (stored, now_rfc3339(), assignment_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(max_points) = req.params.get("maxPoints").and_then(|v| v.as_f64()) {
        validate_max_points(max_points)?;
        conn.execute(
            "UPDATE assignments SET max_points = ?, updated_at = ? WHERE id = ?",
            (max_points, now_rfc3339(), assignment_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(date) = opt_str(&req.params, "date") {
        conn.execute(
            "UPDATE assignments SET date = ?, updated_at = ? WHERE id = ?",
            (date, now_rfc3339(), assignment_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(completed) = opt_bool(&req.params, "completed") {
        conn.execute(
            "UPDATE assignments SET completed = ?, updated_at = ? WHERE id = ?",
            (completed as i64, now_rfc3339(), assignment_id),
        )
        .map_err(HandlerErr::db)?;
    }

    Ok(ok(&req.id, json!({ "updated": true })))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = require_str(&req.params, "assignmentId")?;
    require_assignment(conn, assignment_id)?;

    // Deleting an assignment removes its grade rows with it.
    let grades_deleted = conn
        .execute("DELETE FROM grades WHERE assignment_id = ?", [assignment_id])
        .map_err(HandlerErr::db)?;
    conn.execute("DELETE FROM assignments WHERE id = ?", [assignment_id])
        .map_err(HandlerErr::db)?;

    Ok(ok(
        &req.id,
        json!({ "deleted": true, "gradesDeleted": grades_deleted }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignments.list" => Some(handle_list(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "assignments.create" => {
            Some(handle_create(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        "assignments.update" => {
            Some(handle_update(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        "assignments.delete" => {
            Some(handle_delete(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        _ => None,
    }
}
