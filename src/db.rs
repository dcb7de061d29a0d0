use crate::calc::{Assignment, CategoryWeights, GradeRecord};
use rusqlite::Connection;
use std::path::Path;

pub const DB_FILE_NAME: &str = "gradebook.sqlite3";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            subject TEXT,
            updated_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class ON students(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_class_sort ON students(class_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            title TEXT NOT NULL,
            category TEXT,
            max_points REAL NOT NULL,
            date TEXT,
            completed INTEGER NOT NULL DEFAULT 0,
            sort_order INTEGER NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    ensure_assignments_completed(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class ON assignments(class_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class_sort ON assignments(class_id, sort_order)",
        [],
    )?;

    // One row per (assignment, student); writes are upserts. A row with
    // score = 0 is a real mark; "no submission" has no row at all.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            score REAL NOT NULL,
            updated_at TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id),
            FOREIGN KEY(student_id) REFERENCES students(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_assignment ON grades(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student ON grades(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS category_weights(
            class_id TEXT NOT NULL,
            category TEXT NOT NULL,
            weight REAL NOT NULL,
            PRIMARY KEY(class_id, category),
            FOREIGN KEY(class_id) REFERENCES classes(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_category_weights_class ON category_weights(class_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_assignments_completed(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces predate the completion flag. Add it if missing.
    if table_has_column(conn, "assignments", "completed")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE assignments ADD COLUMN completed INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Assignments of one class in the shape the aggregator consumes.
pub fn load_class_assignments(
    conn: &Connection,
    class_id: &str,
) -> rusqlite::Result<Vec<Assignment>> {
    let mut stmt = conn.prepare(
        "SELECT id, category, max_points
         FROM assignments
         WHERE class_id = ?
         ORDER BY sort_order",
    )?;
    let rows = stmt.query_map([class_id], |r| {
        Ok(Assignment {
            id: r.get(0)?,
            category: r.get(1)?,
            max_points: r.get(2)?,
        })
    })?;
    rows.collect()
}

/// All grade rows attached to one class's assignments.
pub fn load_class_grades(conn: &Connection, class_id: &str) -> rusqlite::Result<Vec<GradeRecord>> {
    let mut stmt = conn.prepare(
        "SELECT g.student_id, g.assignment_id, g.score
         FROM grades g
         JOIN assignments a ON a.id = g.assignment_id
         WHERE a.class_id = ?",
    )?;
    let rows = stmt.query_map([class_id], |r| {
        Ok(GradeRecord {
            student_id: r.get(0)?,
            assignment_id: r.get(1)?,
            score: r.get(2)?,
        })
    })?;
    rows.collect()
}

/// Stored weight configuration for a class; `None` when no rows exist, so the
/// caller can fall back to the default policy.
pub fn load_category_weights(
    conn: &Connection,
    class_id: &str,
) -> rusqlite::Result<Option<CategoryWeights>> {
    let mut stmt = conn.prepare(
        "SELECT category, weight FROM category_weights WHERE class_id = ?",
    )?;
    let rows = stmt.query_map([class_id], |r| {
        Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
    })?;

    let mut weights = CategoryWeights::new();
    let mut any = false;
    for row in rows {
        let (category, weight) = row?;
        weights.set(category, weight);
        any = true;
    }
    Ok(if any { Some(weights) } else { None })
}
