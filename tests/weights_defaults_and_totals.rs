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

fn request(
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
    serde_json::from_str(line.trim()).expect("parse response json")
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn weight_of(res: &serde_json::Value, category: &str) -> Option<f64> {
    res.get("weights")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .find(|w| w.get("category").and_then(|v| v.as_str()) == Some(category))
        })
        .and_then(|w| w.get("weight"))
        .and_then(|v| v.as_f64())
}

#[test]
fn unconfigured_class_reports_default_policy() {
    let workspace = temp_dir("gradebook-weights-default");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(&mut stdin, &mut reader, "c1", "classes.create", json!({ "name": "Sci 7" }));
    let class_id = class.get("id").and_then(|v| v.as_str()).expect("class id").to_string();

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "w1",
        "weights.get",
        json!({ "classId": class_id }),
    );
    assert_eq!(res.get("isDefault").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(res.get("totalWeight").and_then(|v| v.as_f64()), Some(100.0));
    assert_eq!(weight_of(&res, "Homework"), Some(20.0));
    assert_eq!(weight_of(&res, "Test"), Some(30.0));
    assert_eq!(weight_of(&res, "Midterm Exam"), Some(20.0));
    assert_eq!(weight_of(&res, "End Semester Exam"), Some(30.0));

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn stored_weights_need_not_sum_to_100() {
    let workspace = temp_dir("gradebook-weights-total");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(&mut stdin, &mut reader, "c1", "classes.create", json!({ "name": "Sci 7" }));
    let class_id = class.get("id").and_then(|v| v.as_str()).expect("class id").to_string();

    // A map totalling 20 is accepted and echoed; no rejection, no scaling.
    let res = request_ok(
        &mut stdin,
        &mut reader,
        "w1",
        "weights.set",
        json!({ "classId": class_id, "weights": { "Lab": 10, "Quiz": 10 } }),
    );
    assert_eq!(res.get("totalWeight").and_then(|v| v.as_f64()), Some(20.0));

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "w2",
        "weights.get",
        json!({ "classId": class_id }),
    );
    assert_eq!(res.get("isDefault").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(weight_of(&res, "Lab"), Some(10.0));
    assert_eq!(weight_of(&res, "Quiz"), Some(10.0));

    // Full marks in both categories => 100%, renormalized over 0.2 of
    // nominal weight.
    let student = request_ok(
        &mut stdin,
        &mut reader,
        "s1",
        "students.create",
        json!({ "classId": class_id, "lastName": "Ortiz", "firstName": "Ben" }),
    );
    let student_id = student.get("id").and_then(|v| v.as_str()).expect("student id").to_string();
    for (i, (title, category, max, score)) in
        [("Lab 1", "Lab", 50.0, 50.0), ("Quiz 1", "Quiz", 20.0, 20.0)]
            .iter()
            .enumerate()
    {
        let a = request_ok(
            &mut stdin,
            &mut reader,
            &format!("a{}", i),
            "assignments.create",
            json!({ "classId": class_id, "title": title, "category": category, "maxPoints": max }),
        );
        let assignment_id = a.get("id").and_then(|v| v.as_str()).expect("assignment id");
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            &format!("g{}", i),
            "grades.set",
            json!({ "assignmentId": assignment_id, "studentId": student_id, "score": score }),
        );
    }

    let res = request_ok(
        &mut stdin,
        &mut reader,
        "avg",
        "averages.student",
        json!({ "classId": class_id, "studentId": student_id }),
    );
    let avg = res.get("average").and_then(|v| v.as_f64()).expect("average");
    assert!((avg - 100.0).abs() < 1e-9);

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn negative_weights_are_rejected() {
    let workspace = temp_dir("gradebook-weights-negative");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let class = request_ok(&mut stdin, &mut reader, "c1", "classes.create", json!({ "name": "Sci 7" }));
    let class_id = class.get("id").and_then(|v| v.as_str()).expect("class id").to_string();

    let resp = request(
        &mut stdin,
        &mut reader,
        "w1",
        "weights.set",
        json!({ "classId": class_id, "weights": { "Lab": -5 } }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.get("error").and_then(|e| e.get("code")).and_then(|v| v.as_str()),
        Some("bad_params")
    );

    let _ = child.kill();
    let _ = std::fs::remove_dir_all(workspace);
}
