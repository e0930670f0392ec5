mod test_support;

use serde_json::json;
use test_support::*;

struct AttendanceFixture {
    teacher_token: String,
    ada_id: String,
    bola_id: String,
    admin_token: String,
}

fn seed_attendance_fixture(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    prefix: &str,
) -> AttendanceFixture {
    let seed = seed_school(stdin, reader, prefix);
    let teacher_id = create_teacher(
        stdin,
        reader,
        &seed.admin_token,
        "lead@test.school",
        "class_teacher",
        None,
    );
    let subject_id = create_subject(stdin, reader, &seed.admin_token, "Geography", "GEO");
    assign_subject(stdin, reader, &seed.admin_token, &teacher_id, &subject_id, &["SS1 Silver"]);
    let ada_id = create_student(
        stdin,
        reader,
        &seed.admin_token,
        "ada@test.school",
        "Ada",
        "Abel",
        "SS1 Silver",
    );
    let bola_id = create_student(
        stdin,
        reader,
        &seed.admin_token,
        "bola@test.school",
        "Bola",
        "Bello",
        "SS1 Silver",
    );
    let teacher_token = login(stdin, reader, &seed.school_id, "lead@test.school", "teacher-pass");
    AttendanceFixture {
        teacher_token,
        ada_id,
        bola_id,
        admin_token: seed.admin_token,
    }
}

#[test]
fn remarking_a_day_overwrites_the_earlier_status() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_attendance_fixture(&mut stdin, &mut reader, "schoolhub-att-remark");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.record",
        json!({
            "sessionToken": fx.teacher_token,
            "date": "2026-03-02",
            "entries": [{ "studentId": fx.ada_id, "status": "absent" }],
        }),
    );
    // Corrected later in the day: same student, same date, new status.
    let recorded = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.record",
        json!({
            "sessionToken": fx.teacher_token,
            "date": "2026-03-02",
            "entries": [{ "studentId": fx.ada_id, "status": "present" }],
        }),
    );
    assert_eq!(recorded["recorded"], 1);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.list",
        json!({
            "sessionToken": fx.teacher_token,
            "date": "2026-03-02",
            "studentId": fx.ada_id,
        }),
    );
    let records = listed["records"].as_array().unwrap();
    assert_eq!(records.len(), 1, "one row per student per day");
    assert_eq!(records[0]["status"], "present");
}

#[test]
fn list_filters_by_date_status_and_student() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_attendance_fixture(&mut stdin, &mut reader, "schoolhub-att-filters");

    for (date, ada, bola) in [
        ("2026-03-02", "present", "absent"),
        ("2026-03-03", "late", "present"),
    ] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            "teacher.class.attendance.record",
            json!({
                "sessionToken": fx.teacher_token,
                "date": date,
                "entries": [
                    { "studentId": fx.ada_id, "status": ada },
                    { "studentId": fx.bola_id, "status": bola },
                ],
            }),
        );
    }

    let by_date = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.list",
        json!({ "sessionToken": fx.teacher_token, "date": "2026-03-02" }),
    );
    assert_eq!(by_date["records"].as_array().unwrap().len(), 2);

    let absences = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.list",
        json!({ "sessionToken": fx.teacher_token, "status": "absent" }),
    );
    let records = absences["records"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["studentId"], json!(fx.bola_id));

    let ada_only = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.list",
        json!({ "sessionToken": fx.teacher_token, "studentId": fx.ada_id }),
    );
    let records = ada_only["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    // Newest day first.
    assert_eq!(records[0]["date"], "2026-03-03");
    assert!(records.iter().all(|r| r["studentId"] == json!(fx.ada_id)));
}

#[test]
fn batch_with_an_out_of_scope_student_writes_nothing() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_attendance_fixture(&mut stdin, &mut reader, "schoolhub-att-scope");

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
        "teacher.class.attendance.record",
        json!({
            "sessionToken": fx.teacher_token,
            "date": "2026-03-02",
            "entries": [
                { "studentId": fx.ada_id, "status": "present" },
                { "studentId": outsider, "status": "present" },
            ],
        }),
    );
    assert_eq!(error["code"], "not_found");
    assert_eq!(error_status(&error), 404);

    // The in-scope entry was not written either: the batch is all or nothing.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.class.attendance.list",
        json!({ "sessionToken": fx.teacher_token, "date": "2026-03-02" }),
    );
    assert_eq!(listed["records"].as_array().unwrap().len(), 0);
}
