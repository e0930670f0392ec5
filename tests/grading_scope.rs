mod test_support;

use serde_json::json;
use test_support::*;

struct GradingFixture {
    teacher_token: String,
    subject_id: String,
    in_class: String,
    out_of_class: String,
}

fn seed_grading_fixture(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    prefix: &str,
) -> GradingFixture {
    let seed = seed_school(stdin, reader, prefix);
    let teacher_id = create_teacher(
        stdin,
        reader,
        &seed.admin_token,
        "subject@test.school",
        "subject_teacher",
        None,
    );
    let subject_id = create_subject(stdin, reader, &seed.admin_token, "Chemistry", "CHM");
    assign_subject(stdin, reader, &seed.admin_token, &teacher_id, &subject_id, &["SS1 Silver"]);
    let in_class = create_student(
        stdin,
        reader,
        &seed.admin_token,
        "ada@test.school",
        "Ada",
        "Abel",
        "ss1 silver",
    );
    let out_of_class = create_student(
        stdin,
        reader,
        &seed.admin_token,
        "zara@test.school",
        "Zara",
        "Zubair",
        "SS2 Gold",
    );
    let teacher_token = login(stdin, reader, &seed.school_id, "subject@test.school", "teacher-pass");
    GradingFixture {
        teacher_token,
        subject_id,
        in_class,
        out_of_class,
    }
}

#[test]
fn percentage_is_derived_once_at_record_time() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_grading_fixture(&mut stdin, &mut reader, "schoolhub-grade");

    let recorded = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.subject.grading.record",
        json!({
            "sessionToken": fx.teacher_token,
            "subjectId": fx.subject_id,
            "studentId": fx.in_class,
            "score": 17.0,
            "maxScore": 20.0,
            "term": 1,
            "academicYear": "2025/2026",
        }),
    );
    assert_eq!(recorded["percentage"], 85.0);

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "teacher.subject.grading.list",
        json!({ "sessionToken": fx.teacher_token, "subjectId": fx.subject_id }),
    );
    let grades = listed["grades"].as_array().unwrap();
    assert_eq!(grades.len(), 1);
    assert_eq!(grades[0]["percentage"], 85.0);
    assert_eq!(grades[0]["studentName"], "Abel, Ada");
    assert_eq!(grades[0]["term"], 1);
}

#[test]
fn grading_outside_the_subject_classes_reads_as_absent() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_grading_fixture(&mut stdin, &mut reader, "schoolhub-grade-scope");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.subject.grading.record",
        json!({
            "sessionToken": fx.teacher_token,
            "subjectId": fx.subject_id,
            "studentId": fx.out_of_class,
            "score": 10.0,
            "maxScore": 20.0,
            "term": 1,
            "academicYear": "2025/2026",
        }),
    );
    assert_eq!(error["code"], "not_found");
    assert_eq!(error_status(&error), 404);
}

#[test]
fn score_bounds_are_validated() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let fx = seed_grading_fixture(&mut stdin, &mut reader, "schoolhub-grade-bounds");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.subject.grading.record",
        json!({
            "sessionToken": fx.teacher_token,
            "subjectId": fx.subject_id,
            "studentId": fx.in_class,
            "score": 5.0,
            "maxScore": 0.0,
            "term": 1,
            "academicYear": "2025/2026",
        }),
    );
    assert_eq!(error["code"], "bad_params");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.subject.grading.record",
        json!({
            "sessionToken": fx.teacher_token,
            "subjectId": fx.subject_id,
            "studentId": fx.in_class,
            "score": 25.0,
            "maxScore": 20.0,
            "term": 1,
            "academicYear": "2025/2026",
        }),
    );
    assert_eq!(error["code"], "bad_params");

    let error = request_err(
        &mut stdin,
        &mut reader,
        "teacher.subject.grading.record",
        json!({
            "sessionToken": fx.teacher_token,
            "subjectId": fx.subject_id,
            "studentId": fx.in_class,
            "score": 10.0,
            "maxScore": 20.0,
            "term": 4,
            "academicYear": "2025/2026",
        }),
    );
    assert_eq!(error["code"], "bad_params");
}
