use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn deleting_an_assignment_removes_its_grades() {
    let workspace = temp_dir("gradebook-cascade");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let class = request_ok(&mut stdin, &mut reader, "c1", "classes.create", json!({ "name": "Eng 9" }));
    let class_id = class.get("id").and_then(|v| v.as_str()).expect("class id").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({ "classId": class_id, "lastName": "Klein", "firstName": "Ana" }),
    );
    let student_id = student.get("id").and_then(|v| v.as_str()).expect("student id").to_string();
    let assignment = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({ "classId": class_id, "title": "Essay", "category": "Homework", "maxPoints": 100 }),
    );
    let assignment_id = assignment.get("id").and_then(|v| v.as_str()).expect("assignment id").to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "g1",
        "grades.set",
        json!({ "assignmentId": assignment_id, "studentId": student_id, "score": 70 }),
    );

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "d1",
        "assignments.delete",
        json!({ "assignmentId": assignment_id }),
    );
    assert_eq!(res.get("gradesDeleted").and_then(|v| v.as_i64()), Some(1));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "g2",
        "grades.list",
        json!({ "classId": class_id }),
    );
    assert_eq!(
        res.get("grades").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(0)
    );

    // With the only graded assignment gone, the student is back to "no
    // data".
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "avg",
        "averages.student",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    assert!(res.get("average").expect("average field").is_null());

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn grade_upsert_replaces_prior_score() {
    let workspace = temp_dir("gradebook-upsert");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let class = request_ok(&mut stdin, &mut reader, "c1", "classes.create", json!({ "name": "Eng 9" }));
    let class_id = class.get("id").and_then(|v| v.as_str()).expect("class id").to_string();
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({ "classId": class_id, "lastName": "Klein", "firstName": "Ana" }),
    );
    let student_id = student.get("id").and_then(|v| v.as_str()).expect("student id").to_string();
    let assignment = request_ok(
        &mut stdin,
        &mut reader,
        "a1",
        "assignments.create",
        json!({ "classId": class_id, "title": "Essay", "category": "Homework", "maxPoints": 100 }),
    );
    let assignment_id = assignment.get("id").and_then(|v| v.as_str()).expect("assignment id").to_string();

    for (i, score) in [40.0, 90.0].iter().enumerate() {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "grades.set",
            json!({ "assignmentId": assignment_id, "studentId": student_id, "score": score }),
        );
    }

    // One row per pair; the second write replaced the first.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "grades.list",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    let grades = res.get("grades").and_then(|v| v.as_array()).expect("grades");
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0].get("score").and_then(|v| v.as_f64()), Some(90.0));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
