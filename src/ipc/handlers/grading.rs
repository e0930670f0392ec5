use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, optional_date, optional_i64, optional_str, page_limit, paginate, pagination_json,
    require_auth, required_f64, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::scope::TeacherScope;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

/// Classes the calling teacher carries for one specific subject. Grading is
/// scoped to this row, not the teacher's whole class scope.
fn subject_scope(
    conn: &Connection,
    teacher_id: &str,
    subject_id: &str,
    school_id: &str,
) -> Result<TeacherScope, ApiError> {
    let row: Option<String> = conn
        .query_row(
            "SELECT ts.classes_json
             FROM teacher_subjects ts
             JOIN subjects s ON s.id = ts.subject_id
             WHERE ts.teacher_id = ? AND ts.subject_id = ? AND s.school_id = ?",
            [teacher_id, subject_id, school_id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(classes_json) = row else {
        return Err(ApiError::not_found("subject not found"));
    };
    let mut scope = TeacherScope::default();
    for name in serde_json::from_str::<Vec<String>>(&classes_json).unwrap_or_default() {
        scope.add(&name);
    }
    Ok(scope)
}

fn student_in_subject_scope(
    conn: &Connection,
    school_id: &str,
    scope: &TeacherScope,
    student_id: &str,
) -> Result<(String, String), ApiError> {
    let row: Option<(String, String, Option<String>)> = conn
        .query_row(
            "SELECT u.last_name, u.first_name, sp.class_name
             FROM users u
             JOIN student_profiles sp ON sp.user_id = u.id
             WHERE u.id = ? AND u.school_id = ? AND u.role = 'student' AND u.active = 1",
            [student_id, school_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    match row {
        Some((last, first, class_name)) if scope.contains(class_name.as_deref()) => {
            Ok((format!("{}, {}", last, first), class_name.unwrap_or_default()))
        }
        _ => Err(ApiError::not_found("student not found")),
    }
}

/// Records one grade. The percentage is derived here, once, and clamped to
/// [0,100]; it is never recomputed from score/maxScore later.
fn grading_record(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let student_id = required_str(&req.params, "studentId")?;
    let score = required_f64(&req.params, "score")?;
    let max_score = required_f64(&req.params, "maxScore")?;
    let term = optional_i64(&req.params, "term")
        .filter(|t| (1..=3).contains(t))
        .ok_or_else(|| ApiError::bad_params("term must be 1, 2 or 3"))?;
    let academic_year = required_str(&req.params, "academicYear")?;
    let assessment_date = optional_date(&req.params, "assessmentDate")?
        .map(|d| d.format("%Y-%m-%d").to_string());

    if max_score <= 0.0 {
        return Err(ApiError::bad_params("maxScore must be positive"));
    }
    if score < 0.0 || score > max_score {
        return Err(ApiError::bad_params("score must be between 0 and maxScore"));
    }

    let scope = subject_scope(conn, &principal.user_id, &subject_id, &principal.school_id)?;
    student_in_subject_scope(conn, &principal.school_id, &scope, &student_id)?;

    let percentage = (100.0 * score / max_score).clamp(0.0, 100.0);
    let grade_id = db::new_id();
    conn.execute(
        "INSERT INTO grades(id, student_id, subject_id, school_id, term, academic_year,
                            score, max_score, percentage, assessment_date, recorded_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            grade_id,
            student_id,
            subject_id,
            principal.school_id,
            term,
            academic_year,
            score,
            max_score,
            percentage,
            assessment_date,
            principal.user_id,
            db::now_ts(),
        ],
    )?;

    Ok(json!({
        "gradeId": grade_id,
        "percentage": percentage,
    }))
}

fn grading_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let (page, limit) = page_limit(&req.params, 50)?;
    let term = optional_i64(&req.params, "term");
    let academic_year = optional_str(&req.params, "academicYear");
    let student_filter = optional_str(&req.params, "studentId");

    let scope = subject_scope(conn, &principal.user_id, &subject_id, &principal.school_id)?;

    let mut stmt = conn.prepare(
        "SELECT g.id, g.student_id, u.last_name, u.first_name, sp.class_name,
                g.term, g.academic_year, g.score, g.max_score, g.percentage, g.assessment_date
         FROM grades g
         JOIN users u ON u.id = g.student_id
         JOIN student_profiles sp ON sp.user_id = g.student_id
         WHERE g.subject_id = ? AND g.school_id = ?
         ORDER BY g.created_at DESC",
    )?;
    let rows: Vec<(Value, Option<String>)> = stmt
        .query_map([&subject_id, &principal.school_id], |r| {
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            let class_name: Option<String> = r.get(4)?;
            Ok((
                json!({
                    "id": r.get::<_, String>(0)?,
                    "studentId": r.get::<_, String>(1)?,
                    "studentName": format!("{}, {}", last, first),
                    "className": class_name,
                    "term": r.get::<_, i64>(5)?,
                    "academicYear": r.get::<_, String>(6)?,
                    "score": r.get::<_, f64>(7)?,
                    "maxScore": r.get::<_, f64>(8)?,
                    "percentage": r.get::<_, f64>(9)?,
                    "assessmentDate": r.get::<_, Option<String>>(10)?,
                }),
                class_name,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let filtered: Vec<Value> = rows
        .into_iter()
        .filter(|(_, class_name)| scope.contains(class_name.as_deref()))
        .map(|(row, _)| row)
        .filter(|row| {
            term.map(|t| row.get("term").and_then(|v| v.as_i64()) == Some(t))
                .unwrap_or(true)
        })
        .filter(|row| {
            academic_year
                .as_deref()
                .map(|y| row.get("academicYear").and_then(|v| v.as_str()) == Some(y))
                .unwrap_or(true)
        })
        .filter(|row| {
            student_filter
                .as_deref()
                .map(|s| row.get("studentId").and_then(|v| v.as_str()) == Some(s))
                .unwrap_or(true)
        })
        .collect();

    let (page_items, total) = paginate(filtered, page, limit);
    Ok(json!({
        "grades": page_items,
        "pagination": pagination_json(total, page, limit),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.subject.grading.record" => grading_record(state, req),
        "teacher.subject.grading.list" => grading_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
