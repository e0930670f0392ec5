mod test_support;

use serde_json::{json, Value};
use test_support::*;

struct AlertFixture {
    teacher_token: String,
    student_token: String,
    student_id: String,
    admin_token: String,
}

fn seed_alert_fixture(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    prefix: &str,
) -> AlertFixture {
    let seed = seed_school(stdin, reader, prefix);
    let teacher_id = create_teacher(
        stdin,
        reader,
        &seed.admin_token,
        "lead@test.school",
        "class_teacher",
        None,
    );
    let subject_id = create_subject(stdin, reader, &seed.admin_token, "English", "ENG");
    assign_subject(stdin, reader, &seed.admin_token, &teacher_id, &subject_id, &["JSS1 A"]);
    let student_id = create_student(
        stdin,
        reader,
        &seed.admin_token,
        "ada@test.school",
        "Ada",
        "Abel",
        "JSS1 A",
    );
    let teacher_token = login(stdin, reader, &seed.school_id, "lead@test.school", "teacher-pass");
    let student_token = login(stdin, reader, &seed.school_id, "ada@test.school", "student-pass");
    AlertFixture {
        teacher_token,
        student_token,
        student_id,
        admin_token: seed.admin_token,
    }
}

fn notifications(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    token: &str,
) -> Vec<Value> {
    let result = request_ok(
        stdin,
        reader,
        "notifications.list",
        json!({ "sessionToken": token }),
    );
    result["notifications"].as_array().cloned().unwrap_or_default()
}

#[test]
fn urgent_alert_notifies_student_and_admins() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_alert_fixture(&mut stdin, &mut reader, "schoolhub-alert-urgent");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.create",
        json!({
            "sessionToken": fx.teacher_token,
            "studentId": fx.student_id,
            "alertType": "academic",
            "priority": "urgent",
            "title": "Failing three subjects",
        }),
    );
    assert_eq!(created["status"], "active");
    assert_eq!(created["notificationsCreated"], 2);

    let student_seen = notifications(&mut stdin, &mut reader, &fx.student_token);
    assert_eq!(student_seen.len(), 1);
    assert_eq!(student_seen[0]["type"], "warning");

    let admin_seen = notifications(&mut stdin, &mut reader, &fx.admin_token);
    let broadcast: Vec<&Value> = admin_seen
        .iter()
        .filter(|n| n["userId"].is_null())
        .collect();
    assert_eq!(broadcast.len(), 1);
    assert_eq!(broadcast[0]["type"], "alert");
    let body = broadcast[0]["body"].as_str().unwrap();
    assert!(body.contains("urgent"), "body names the priority: {}", body);
    assert!(body.contains("Abel"), "body names the student: {}", body);
}

#[test]
fn low_priority_alert_stays_with_the_student() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_alert_fixture(&mut stdin, &mut reader, "schoolhub-alert-low");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.create",
        json!({
            "sessionToken": fx.teacher_token,
            "studentId": fx.student_id,
            "alertType": "attendance",
            "priority": "low",
            "title": "Two absences this week",
        }),
    );
    assert_eq!(created["notificationsCreated"], 1);

    let student_seen = notifications(&mut stdin, &mut reader, &fx.student_token);
    assert_eq!(student_seen.len(), 1);
    assert_eq!(student_seen[0]["type"], "info");

    let admin_seen = notifications(&mut stdin, &mut reader, &fx.admin_token);
    assert!(admin_seen.iter().all(|n| !n["userId"].is_null()));
}

#[test]
fn alert_status_walks_the_lifecycle() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_alert_fixture(&mut stdin, &mut reader, "schoolhub-alert-lifecycle");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.create",
        json!({
            "sessionToken": fx.teacher_token,
            "studentId": fx.student_id,
            "alertType": "behavioral",
            "priority": "normal",
            "title": "Disrupting class",
        }),
    );
    let alert_id = created["alertId"].as_str().unwrap().to_string();

    let moved = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.updateStatus",
        json!({ "sessionToken": fx.teacher_token, "alertId": alert_id, "status": "in_progress" }),
    );
    assert_eq!(moved["status"], "in_progress");

    // Reopening is not a legal move.
    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.updateStatus",
        json!({ "sessionToken": fx.teacher_token, "alertId": alert_id, "status": "active" }),
    );
    assert_eq!(error["code"], "bad_params");
    assert_eq!(error_status(&error), 400);

    let resolved = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.updateStatus",
        json!({ "sessionToken": fx.teacher_token, "alertId": alert_id, "status": "resolved" }),
    );
    assert_eq!(resolved["status"], "resolved");

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.list",
        json!({ "sessionToken": fx.teacher_token }),
    );
    let alerts = listed["alerts"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["status"], "resolved");
    assert!(!alerts[0]["resolvedAt"].is_null());
    assert_eq!(listed["summary"]["resolved"], 1);
    assert_eq!(listed["summary"]["active"], 0);

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.updateStatus",
        json!({ "sessionToken": fx.teacher_token, "alertId": alert_id, "status": "in_progress" }),
    );
    assert_eq!(error["code"], "bad_params");
}

#[test]
fn alert_for_out_of_scope_student_reads_as_absent() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_alert_fixture(&mut stdin, &mut reader, "schoolhub-alert-scope");

    let outsider = create_student(
        &mut stdin,
        &mut reader,
        &fx.admin_token,
        "zara@test.school",
        "Zara",
        "Zubair",
        "SS2 Gold",
    );
    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.class.alerts.create",
        json!({
            "sessionToken": fx.teacher_token,
            "studentId": outsider,
            "alertType": "academic",
            "title": "Should not land",
        }),
    );
    assert_eq!(error["code"], "not_found");
    assert_eq!(error_status(&error), 404);
}
