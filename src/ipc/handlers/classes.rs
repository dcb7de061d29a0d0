use crate::ipc::error::{ok, HandlerErr};
use crate::ipc::helpers::{now_rfc3339, opt_str, require_class, require_db, require_str};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use uuid::Uuid;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match require_db(state) {
        Ok(c) => c,
        // An unopened workspace lists as empty so a dashboard can render.
        Err(_) => return ok(&req.id, json!({ "classes": [] })),
    };

    // Correlated subqueries avoid double-counting from joins.
    let result = conn
        .prepare(
            "SELECT
               c.id,
               c.name,
               c.subject,
               (SELECT COUNT(*) FROM students s WHERE s.class_id = c.id) AS student_count,
               (SELECT COUNT(*) FROM assignments a WHERE a.class_id = c.id) AS assignment_count
             FROM classes c
             ORDER BY c.name",
        )
        .and_then(|mut stmt| {
            stmt.query_map([], |row| {
                let id: String = row.get(0)?;
                let name: String = row.get(1)?;
                let subject: Option<String> = row.get(2)?;
                let student_count: i64 = row.get(3)?;
                let assignment_count: i64 = row.get(4)?;
                Ok(json!({
                    "id": id,
                    "name": name,
                    "subject": subject,
                    "studentCount": student_count,
                    "assignmentCount": assignment_count
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
        });

    match result {
        Ok(classes) => ok(&req.id, json!({ "classes": classes })),
        Err(e) => HandlerErr::db(e).response(&req.id),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let name = require_str(&req.params, "name")?.trim().to_string();
    if name.is_empty() {
        return Err(HandlerErr::new("bad_params", "name must not be empty"));
    }
    let subject = opt_str(&req.params, "subject").map(|s| s.trim().to_string());

    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO classes(id, name, subject, updated_at) VALUES(?, ?, ?, ?)",
        (&id, &name, &subject, now_rfc3339()),
    )
    .map_err(|e| HandlerErr::new("db_insert_failed", e.to_string()))?;

    Ok(ok(&req.id, json!({ "id": id, "name": name, "subject": subject })))
}

fn handle_update(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;

    if let Some(name) = opt_str(&req.params, "name") {
        let name = name.trim();
        if name.is_empty() {
            return Err(HandlerErr::new("bad_params", "name must not be empty"));
        }
        conn.execute(
            "UPDATE classes SET name = ?, updated_at = ? WHERE id = ?",
            (name, now_rfc3339(), class_id),
        )
        .map_err(HandlerErr::db)?;
    }
    if let Some(subject) = opt_str(&req.params, "subject") {
        conn.execute(
            "UPDATE classes SET subject = ?, updated_at = ? WHERE id = ?",
            (subject.trim(), now_rfc3339(), class_id),
        )
        .map_err(HandlerErr::db)?;
    }

    Ok(ok(&req.id, json!({ "updated": true })))
}

fn handle_delete(state: &mut AppState, req: &Request) -> Result<serde_json::Value, HandlerErr> {
    let conn = require_db(state)?;
    let class_id = require_str(&req.params, "classId")?;
    require_class(conn, class_id)?;

    // Children first to satisfy foreign keys: grades under the class's
    // assignments, then assignments, students, weights, the class row.
    conn.execute(
        "DELETE FROM grades WHERE assignment_id IN
           (SELECT id FROM assignments WHERE class_id = ?)",
        [class_id],
    )
    .map_err(HandlerErr::db)?;
    conn.execute("DELETE FROM assignments WHERE class_id = ?", [class_id])
        .map_err(HandlerErr::db)?;
    conn.execute("DELETE FROM students WHERE class_id = ?", [class_id])
        .map_err(HandlerErr::db)?;
    conn.execute(
        "DELETE FROM category_weights WHERE class_id = ?",
        [class_id],
    )
    .map_err(HandlerErr::db)?;
    conn.execute("DELETE FROM classes WHERE id = ?", [class_id])
        .map_err(HandlerErr::db)?;

    Ok(ok(&req.id, json!({ "deleted": true })))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_list(state, req)),
        "classes.create" => {
            Some(handle_create(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        "classes.update" => {
            Some(handle_update(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        "classes.delete" => {
            Some(handle_delete(state, req).unwrap_or_else(|e| e.response(&req.id)))
        }
        _ => None,
    }
}
