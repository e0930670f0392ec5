use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, filter_str, matches_search, page_limit, paginate, pagination_json, require_auth,
    required_date, required_f64, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::assignment_completion;
use crate::scope::normalize_class_name;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use super::class_students::class_teacher_scope;

fn assignments_create(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let title = required_str(&req.params, "title")?;
    let due_date = required_date(&req.params, "dueDate")?;
    let max_score = required_f64(&req.params, "maxScore")?;
    if max_score <= 0.0 {
        return Err(ApiError::bad_params("maxScore must be positive"));
    }
    let Some(raw_classes) = req.params.get("classes").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("missing classes array"));
    };
    let mut classes: Vec<String> = Vec::new();
    for v in raw_classes {
        let Some(s) = v.as_str() else {
            return Err(ApiError::bad_params("classes must contain only strings"));
        };
        let t = s.trim();
        if t.is_empty() {
            continue;
        }
        if !scope.contains(Some(t)) {
            return Err(ApiError::forbidden(format!(
                "class {} is not in your assigned classes",
                t
            )));
        }
        classes.push(t.to_string());
    }
    if classes.is_empty() {
        return Err(ApiError::bad_params("classes must not be empty"));
    }

    let assignment_id = db::new_id();
    let classes_json = serde_json::to_string(&classes)
        .map_err(|e| ApiError::internal(format!("encode classes: {}", e)))?;
    conn.execute(
        "INSERT INTO assignments(id, school_id, subject_id, title, classes_json, due_date,
                                 max_score, created_by, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        rusqlite::params![
            assignment_id,
            principal.school_id,
            req.params.get("subjectId").and_then(|v| v.as_str()),
            title,
            classes_json,
            due_date.format("%Y-%m-%d").to_string(),
            max_score,
            principal.user_id,
            db::now_ts(),
        ],
    )?;
    Ok(json!({ "assignmentId": assignment_id }))
}

#[derive(Debug, Clone)]
struct AssignmentRow {
    id: String,
    title: String,
    classes: Vec<String>,
    due_date: String,
    max_score: f64,
}

fn load_assignments(conn: &Connection, school_id: &str) -> Result<Vec<AssignmentRow>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, classes_json, due_date, max_score
         FROM assignments
         WHERE school_id = ?
         ORDER BY due_date DESC",
    )?;
    let rows: Vec<AssignmentRow> = stmt
        .query_map([school_id], |r| {
            let classes_json: String = r.get(2)?;
            Ok(AssignmentRow {
                id: r.get(0)?,
                title: r.get(1)?,
                classes: serde_json::from_str(&classes_json).unwrap_or_default(),
                due_date: r.get(3)?,
                max_score: r.get(4)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows)
}

fn teacher_assignments_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let (page, limit) = page_limit(&req.params, 20)?;
    let search = filter_str(&req.params, "search");

    let all = load_assignments(conn, &principal.school_id)?;
    let mut rows: Vec<Value> = Vec::new();
    for a in all {
        if !a.classes.iter().any(|c| scope.contains(Some(c))) {
            continue;
        }
        if let Some(needle) = search.as_deref() {
            if !matches_search(needle, &[&a.title]) {
                continue;
            }
        }
        let submissions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM assignment_submissions WHERE assignment_id = ?",
            [&a.id],
            |r| r.get(0),
        )?;
        rows.push(json!({
            "id": a.id,
            "title": a.title,
            "classes": a.classes,
            "dueDate": a.due_date,
            "maxScore": a.max_score,
            "submissionCount": submissions,
        }));
    }

    let (page_items, total) = paginate(rows, page, limit);
    Ok(json!({
        "assignments": page_items,
        "pagination": pagination_json(total, page, limit),
    }))
}

fn student_class(conn: &Connection, user_id: &str) -> Result<String, ApiError> {
    let class_name: Option<Option<String>> = conn
        .query_row(
            "SELECT class_name FROM student_profiles WHERE user_id = ?",
            [user_id],
            |r| r.get(0),
        )
        .optional()?;
    match class_name {
        Some(Some(c)) if !c.trim().is_empty() => Ok(c),
        _ => Err(ApiError::not_found("student profile has no class")),
    }
}

fn student_assignments_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Student])?;
    let (page, limit) = page_limit(&req.params, 20)?;
    let status_filter = match filter_str(&req.params, "status").as_deref() {
        None => None,
        Some("pending") => Some(false),
        Some("submitted") => Some(true),
        Some(other) => {
            return Err(ApiError::bad_params(format!(
                "status must be all, pending or submitted, got {}",
                other
            )))
        }
    };

    let class_name = student_class(conn, &principal.user_id)?;
    let my_class = normalize_class_name(Some(&class_name));

    let all = load_assignments(conn, &principal.school_id)?;
    let mine: Vec<AssignmentRow> = all
        .into_iter()
        .filter(|a| {
            a.classes
                .iter()
                .any(|c| normalize_class_name(Some(c)) == my_class)
        })
        .collect();

    let assigned = mine.len();
    let mut submitted = 0usize;
    let mut rows: Vec<Value> = Vec::with_capacity(mine.len());
    for a in &mine {
        let submission: Option<(String, Option<f64>, i64)> = conn
            .query_row(
                "SELECT submitted_at, score, is_late
                 FROM assignment_submissions
                 WHERE assignment_id = ? AND student_id = ?",
                [&a.id, &principal.user_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        if submission.is_some() {
            submitted += 1;
        }
        rows.push(json!({
            "id": a.id,
            "title": a.title,
            "dueDate": a.due_date,
            "maxScore": a.max_score,
            "submission": submission.map(|(at, score, late)| json!({
                "submittedAt": at,
                "score": score,
                "isLate": late != 0,
            })),
        }));
    }
    if let Some(want_submitted) = status_filter {
        rows.retain(|r| r.get("submission").map(|s| !s.is_null()).unwrap_or(false) == want_submitted);
    }

    let (page_items, total) = paginate(rows, page, limit);
    Ok(json!({
        "assignments": page_items,
        "summary": {
            "assigned": assigned,
            "submitted": submitted,
            "completionRate": assignment_completion(assigned, submitted),
        },
        "pagination": pagination_json(total, page, limit),
    }))
}

fn student_assignments_submit(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Student])?;
    let assignment_id = required_str(&req.params, "assignmentId")?;

    let class_name = student_class(conn, &principal.user_id)?;
    let my_class = normalize_class_name(Some(&class_name));

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT classes_json, due_date FROM assignments WHERE id = ? AND school_id = ?",
            [&assignment_id, &principal.school_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((classes_json, due_date)) = row else {
        return Err(ApiError::not_found("assignment not found"));
    };
    let targets_me = serde_json::from_str::<Vec<String>>(&classes_json)
        .unwrap_or_default()
        .iter()
        .any(|c| normalize_class_name(Some(c)) == my_class);
    if !targets_me {
        // An assignment for another class is invisible to this student.
        return Err(ApiError::not_found("assignment not found"));
    }

    let already: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM assignment_submissions WHERE assignment_id = ? AND student_id = ?",
            [&assignment_id, &principal.user_id],
            |r| r.get(0),
        )
        .optional()?;
    if already.is_some() {
        return Err(ApiError::conflict("assignment already submitted"));
    }

    let today = chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string();
    let is_late = today > due_date;
    let submission_id = db::new_id();
    conn.execute(
        "INSERT INTO assignment_submissions(id, assignment_id, student_id, submitted_at, is_late)
         VALUES (?, ?, ?, ?, ?)",
        rusqlite::params![
            submission_id,
            assignment_id,
            principal.user_id,
            db::now_ts(),
            is_late as i64,
        ],
    )?;
    Ok(json!({ "submissionId": submission_id, "isLate": is_late }))
}

/// Grades one submission; only the dedicated score fields change, the
/// submission row itself is immutable otherwise.
fn assignments_grade(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let assignment_id = required_str(&req.params, "assignmentId")?;
    let student_id = required_str(&req.params, "studentId")?;
    let score = required_f64(&req.params, "score")?;

    let row: Option<(String, f64)> = conn
        .query_row(
            "SELECT classes_json, max_score FROM assignments WHERE id = ? AND school_id = ?",
            [&assignment_id, &principal.school_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((classes_json, max_score)) = row else {
        return Err(ApiError::not_found("assignment not found"));
    };
    let in_scope = serde_json::from_str::<Vec<String>>(&classes_json)
        .unwrap_or_default()
        .iter()
        .any(|c| scope.contains(Some(c)));
    if !in_scope {
        return Err(ApiError::not_found("assignment not found"));
    }
    if score < 0.0 || score > max_score {
        return Err(ApiError::bad_params("score must be between 0 and maxScore"));
    }

    let updated = conn.execute(
        "UPDATE assignment_submissions SET score = ?, graded_at = ?
         WHERE assignment_id = ? AND student_id = ?",
        rusqlite::params![score, db::now_ts(), assignment_id, student_id],
    )?;
    if updated == 0 {
        return Err(ApiError::not_found("submission not found"));
    }
    Ok(json!({ "graded": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.class.assignments.create" => assignments_create(state, req),
        "teacher.class.assignments.list" => teacher_assignments_list(state, req),
        "teacher.class.assignments.grade" => assignments_grade(state, req),
        "student.assignments.list" => student_assignments_list(state, req),
        "student.assignments.submit" => student_assignments_submit(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
