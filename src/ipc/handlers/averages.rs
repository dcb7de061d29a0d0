use crate::calc;
use crate::db;
use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{require_class, require_db, require_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::Connection;
use serde_json::json;

struct ClassSnapshot {
    assignments: Vec<calc::Assignment>,
    grades: Vec<calc::GradeRecord>,
    weights: calc::CategoryWeights,
    weights_are_default: bool,
}

fn load_snapshot(conn: &Connection, class_id: &str) -> Result<ClassSnapshot, HandlerErr> {
    let assignments = db::load_class_assignments(conn, class_id).map_err(HandlerErr::db)?;
    let grades = db::load_class_grades(conn, class_id).map_err(HandlerErr::db)?;
    let stored = db::load_category_weights(conn, class_id).map_err(HandlerErr::db)?;
    let weights_are_default = stored.is_none();
    // Default seeding is a caller concern; the aggregator only ever sees the
    // map it is handed.
    let weights = stored.unwrap_or_else(calc::default_category_weights);
    Ok(ClassSnapshot {
        assignments,
        grades,
        weights,
        weights_are_default,
    })
}

fn average_fields(avg: Option<f64>) -> (serde_json::Value, serde_json::Value) {
    // `null` on the wire is the "no data" sentinel; clients render "N/A".
    match avg {
        Some(v) => (json!(v), json!(calc::round_display_1dp(v))),
        None => (serde_json::Value::Null, serde_json::Value::Null),
    }
}

fn handle_class(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;
    let snapshot = load_snapshot(conn, class_id)?;

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
            Ok((id, format!("{}, {}", last, first), active != 0, sort_order))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        .map_err(HandlerErr::db)?;

    let rows: Vec<serde_json::Value> = students
        .into_iter()
        .map(|(student_id, display_name, active, sort_order)| {
            let avg = calc::weighted_average(
                &student_id,
                &snapshot.assignments,
                &snapshot.grades,
                &snapshot.weights,
            );
            let (average, average_display) = average_fields(avg);
            json!({
                "studentId": student_id,
                "displayName": display_name,
                "active": active,
                "sortOrder": sort_order,
                "average": average,
                "averageDisplay": average_display
            })
        })
        .collect();

    Ok(ok(
        &req.id,
        json!({
            "classId": class_id,
            "weightsAreDefault": snapshot.weights_are_default,
            "perStudent": rows
        }),
    ))
}

fn handle_student(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    let student_id = require_str(&req.params, "studentId")?;
    require_class(conn, class_id)?;

    let belongs: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM students WHERE id = ? AND class_id = ?",
            (student_id, class_id),
            |r| r.get(0),
        )
        .map_err(HandlerErr::db)?;
    if belongs == 0 {
        return Err(HandlerErr::with_details(
            "not_found",
            "student not found in class",
            json!({ "studentId": student_id, "classId": class_id }),
        ));
    }

    let snapshot = load_snapshot(conn, class_id)?;
    let avg = calc::weighted_average(
        student_id,
        &snapshot.assignments,
        &snapshot.grades,
        &snapshot.weights,
    );
    let breakdown = calc::category_breakdown(
        student_id,
        &snapshot.assignments,
        &snapshot.grades,
        &snapshot.weights,
    );
    let (average, average_display) = average_fields(avg);

    Ok(ok(
        &req.id,
        json!({
            "classId": class_id,
            "studentId": student_id,
            "weightsAreDefault": snapshot.weights_are_default,
            "average": average,
            "averageDisplay": average_display,
            "categories": breakdown
        }),
    ))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "averages.class" => Some(handle_class(state, req).unwrap_or_else(|e| e.response(&req.id))),
        "averages.student" => {
            Some(handle_student(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        _ => None,
    }
}
