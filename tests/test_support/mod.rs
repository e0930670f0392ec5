#![allow(dead_code)]

use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> String {
    NEXT_ID.fetch_add(1, Ordering::Relaxed).to_string()
}

pub fn temp_dir(prefix: &str) -> PathBuf {
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

pub fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_schoolhubd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn schoolhubd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn roundtrip(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: Value,
) -> Value {
    let id = next_id();
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id.as_str()));
    value
}

pub fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: Value,
) -> Value {
    let value = roundtrip(stdin, reader, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

/// Asserts the request failed and returns the error object.
pub fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    method: &str,
    params: Value,
) -> Value {
    let value = roundtrip(stdin, reader, method, params);
    assert!(
        !value.get("ok").and_then(|v| v.as_bool()).unwrap_or(true),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value.get("error").cloned().unwrap_or_else(|| json!({}))
}

pub fn error_status(error: &Value) -> i64 {
    error.get("status").and_then(|v| v.as_i64()).unwrap_or(0)
}

pub struct SeededSchool {
    pub school_id: String,
    pub admin_token: String,
}

/// Opens a fresh workspace, creates a school and logs its admin in.
pub fn seed_school(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    prefix: &str,
) -> SeededSchool {
    let workspace = temp_dir(prefix);
    let _ = request_ok(
        stdin,
        reader,
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let created = request_ok(
        stdin,
        reader,
        "setup.school.create",
        json!({
            "name": "Test School",
            "adminEmail": "admin@test.school",
            "adminPassword": "admin-pass",
        }),
    );
    let school_id = created
        .get("schoolId")
        .and_then(|v| v.as_str())
        .expect("schoolId")
        .to_string();
    let admin_token = login(stdin, reader, &school_id, "admin@test.school", "admin-pass");
    SeededSchool {
        school_id,
        admin_token,
    }
}

pub fn login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    school_id: &str,
    email: &str,
    password: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        "session.login",
        json!({ "schoolId": school_id, "email": email, "password": password }),
    );
    result
        .get("sessionToken")
        .and_then(|v| v.as_str())
        .expect("sessionToken")
        .to_string()
}

pub fn create_student(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    admin_token: &str,
    email: &str,
    first_name: &str,
    last_name: &str,
    class_name: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        "admin.users.create",
        json!({
            "sessionToken": admin_token,
            "role": "student",
            "email": email,
            "password": "student-pass",
            "firstName": first_name,
            "lastName": last_name,
            "profile": { "className": class_name },
        }),
    );
    result
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string()
}

pub fn create_teacher(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    admin_token: &str,
    email: &str,
    department: &str,
    coordinator_class: Option<&str>,
) -> String {
    let mut profile = json!({ "department": department });
    if let Some(c) = coordinator_class {
        profile["coordinatorClass"] = json!(c);
    }
    let result = request_ok(
        stdin,
        reader,
        "admin.users.create",
        json!({
            "sessionToken": admin_token,
            "role": "teacher",
            "email": email,
            "password": "teacher-pass",
            "firstName": "Tessa",
            "lastName": "Teacher",
            "profile": profile,
        }),
    );
    result
        .get("userId")
        .and_then(|v| v.as_str())
        .expect("userId")
        .to_string()
}

pub fn create_subject(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    admin_token: &str,
    name: &str,
    code: &str,
) -> String {
    let result = request_ok(
        stdin,
        reader,
        "setup.subject.create",
        json!({ "sessionToken": admin_token, "name": name, "code": code }),
    );
    result
        .get("subjectId")
        .and_then(|v| v.as_str())
        .expect("subjectId")
        .to_string()
}

pub fn assign_subject(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    admin_token: &str,
    teacher_id: &str,
    subject_id: &str,
    classes: &[&str],
) {
    let _ = request_ok(
        stdin,
        reader,
        "setup.teacherSubject.set",
        json!({
            "sessionToken": admin_token,
            "teacherId": teacher_id,
            "subjectId": subject_id,
            "classes": classes,
        }),
    );
}
