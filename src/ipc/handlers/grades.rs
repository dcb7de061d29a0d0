use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::handlers::assignments::require_assignment;
use crate::ipc::helpers::{now_rfc3339, opt_bool, opt_str, require_class, require_db, require_f64, require_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn resolve_student_class(conn: &Connection, student_id: &str) -> Result<String, HandlerErr> {
    let class_id: Option<String> = conn
        .query_row(
            "SELECT class_id FROM students WHERE id = ?",
            [student_id],
            |r| r.get(0),
        )
        .optional()
        .map_err(HandlerErr::db)?;
    class_id.ok_or_else(|| {
        HandlerErr::with_details(
            "not_found",
            "student not found",
            json!({ "studentId": student_id }),
        )
    })
}

fn upsert_grade(
    conn: &Connection,
    assignment_id: &str,
    student_id: &str,
    score: f64,
) -> Result<(), HandlerErr> {
    let grade_id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO grades(id, assignment_id, student_id, score, updated_at)
         VALUES(?, ?, ?, ?, ?)
         ON CONFLICT(assignment_id, student_id) DO UPDATE SET
           score = excluded.score,
           updated_at = excluded.updated_at",
        (&grade_id, assignment_id, student_id, score, now_rfc3339()),
    )
    .map_err(|e| HandlerErr::with_details("db_insert_failed", e.to_string(), json!({ "table": "grades" })))?;
    Ok(())
}

fn handle_list(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;
    let student_filter = opt_str(&req.params, "studentId").map(str::to_string);

    let mut stmt = conn
        .prepare(
            "SELECT g.student_id, g.assignment_id, g.score
             FROM grades g
             JOIN assignments a ON a.id = g.assignment_id
             WHERE a.class_id = ?
             ORDER BY a.sort_order, g.student_id",
        )
        .map_err(HandlerErr::db)?;
    let rows = stmt
        .query_map([class_id], |row| {
            let student_id: String = row.get(0)?;
            let assignment_id: String = row.get(1)?;
            let score: f64 = row.get(2)?;
            Ok((student_id, assignment_id, score))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let grades: Vec<serde_json::Value> = rows
        .into_iter()
        .filter(|(sid, _, _)| student_filter.as_deref().map(|f| f == sid).unwrap_or(true))
        .map(|(student_id, assignment_id, score)| {
            json!({
                "studentId": student_id,
                "assignmentId": assignment_id,
                "score": score
            })
        })
        .collect();

    Ok(ok(&req.id, json!({ "grades": grades })))
}

fn handle_set(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = require_str(&req.params, "assignmentId")?;
    let student_id = require_str(&req.params, "studentId")?;
    let score = require_f64(&req.params, "score")?;

    if !score.is_finite() || score < 0.0 {
        return Err(HandlerErr::with_details(
            "bad_params",
            "score must be a non-negative number",
            json!({ "score": score }),
        ));
    }

    let assignment_class = require_assignment(conn, assignment_id)?;
    let student_class = resolve_student_class(conn, student_id)?;
    if assignment_class != student_class {
        return Err(HandlerErr::with_details(
            "bad_params",
            "student and assignment belong to different classes",
            json!({ "assignmentClassId": assignment_class, "studentClassId": student_class }),
        ));
    }

    upsert_grade(conn, assignment_id, student_id, score)?;
    Ok(ok(&req.id, json!({ "saved": true, "score": score })))
}

fn handle_clear(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let assignment_id = require_str(&req.params, "assignmentId")?;
    let student_id = require_str(&req.params, "studentId")?;

    // Clearing removes the record entirely: back to "no submission", which
    // the aggregator excludes. Not the same as writing a 0.
    let deleted = conn
        .execute(
            "DELETE FROM grades WHERE assignment_id = ? AND student_id = ?",
            (assignment_id, student_id),
        )
        .map_err(HandlerErr::db)?;

    Ok(ok(&req.id, json!({ "cleared": deleted > 0 })))
}

fn handle_purge_empty(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;
    let include_zero = opt_bool(&req.params, "includeZeroScores").unwrap_or(false);

    // A score of 0 is a real mark, not an empty cell. Deleting zero rows
    // rewrites every average they touched, so it only happens when the
    // caller asks for it by name.
    let deleted = if include_zero {
        conn.execute(
            "DELETE FROM grades WHERE score = 0 AND assignment_id IN
               (SELECT id FROM assignments WHERE class_id = ?)",
            [class_id],
        )
        .map_err(HandlerErr::db)?
    } else {
        0
    };

    Ok(ok(
        &req.id,
        json!({ "deleted": deleted, "includeZeroScores": include_zero }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "grades.list" => Some(handle_list(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "grades.set" => Some(handle_set(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "grades.clear" => Some(handle_clear(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "grades.purgeEmpty" => {
            Some(handle_purge_empty(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        _ => None,
    }
}
