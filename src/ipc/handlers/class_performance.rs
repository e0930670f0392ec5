use crate::calendar;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, optional_i64, optional_str, page_limit, paginate, pagination_json, require_auth, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{
    self, class_summary, student_metrics, AttendanceStatus, StudentMetrics,
};
use crate::scope::{normalize_class_name, scoped_student, scoped_students, RosterStudent};
use rusqlite::Connection;
use serde_json::{json, Value};

use super::class_students::class_teacher_scope;

/// Term window the metrics are computed over. Explicit params win; otherwise
/// the school's academic calendar decides what "current" means.
#[derive(Debug, Clone)]
pub struct TermSelection {
    pub academic_year: Option<String>,
    pub term: Option<i64>,
    pub window: Option<(String, String)>,
}

pub fn select_term(
    conn: &Connection,
    school_id: &str,
    params: &Value,
) -> Result<TermSelection, ApiError> {
    let academic_year = optional_str(params, "academicYear");
    let term = optional_i64(params, "term");
    let (academic_year, term) = match (academic_year, term) {
        (Some(y), Some(t)) => (Some(y), Some(t)),
        (y, t) => {
            match calendar::resolve_term(conn, school_id, chrono::Utc::now().date_naive())? {
                Some(w) => (
                    Some(y.unwrap_or(w.academic_year)),
                    Some(t.unwrap_or(w.term)),
                ),
                // No calendar configured: aggregate over everything.
                None => (y, t),
            }
        }
    };
    let window = match (&academic_year, term) {
        (Some(y), Some(t)) => {
            calendar::term_window(conn, school_id, y, t)?.map(|w| (w.start_date, w.end_date))
        }
        _ => None,
    };
    Ok(TermSelection {
        academic_year,
        term,
        window,
    })
}

/// Assignment targets for a school, decoded once per request.
pub struct AssignmentTargets {
    entries: Vec<(String, Vec<String>)>,
}

impl AssignmentTargets {
    pub fn load(conn: &Connection, school_id: &str) -> Result<Self, ApiError> {
        let mut stmt =
            conn.prepare("SELECT id, classes_json FROM assignments WHERE school_id = ?")?;
        let rows: Vec<(String, String)> = stmt
            .query_map([school_id], |r| Ok((r.get(0)?, r.get(1)?)))
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        let entries = rows
            .into_iter()
            .map(|(id, classes_json)| {
                let classes: Vec<String> = serde_json::from_str::<Vec<String>>(&classes_json)
                    .unwrap_or_default()
                    .iter()
                    .map(|c| normalize_class_name(Some(c)))
                    .collect();
                (id, classes)
            })
            .collect();
        Ok(Self { entries })
    }

    pub fn for_class(&self, class_name: &str) -> Vec<&str> {
        let norm = normalize_class_name(Some(class_name));
        if norm.is_empty() {
            return Vec::new();
        }
        self.entries
            .iter()
            .filter(|(_, classes)| classes.contains(&norm))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

pub fn metrics_for_student(
    conn: &Connection,
    school_id: &str,
    student: &RosterStudent,
    selection: &TermSelection,
    targets: &AssignmentTargets,
) -> Result<StudentMetrics, ApiError> {
    let percentages = grade_percentages(conn, school_id, &student.user_id, selection)?;
    let attendance = attendance_statuses(conn, school_id, &student.user_id, selection)?;

    let assigned = targets.for_class(&student.class_name);
    let mut submitted = 0usize;
    if !assigned.is_empty() {
        let mut stmt = conn.prepare(
            "SELECT 1 FROM assignment_submissions WHERE assignment_id = ? AND student_id = ?",
        )?;
        for assignment_id in &assigned {
            if stmt.exists([*assignment_id, student.user_id.as_str()])? {
                submitted += 1;
            }
        }
    }

    Ok(student_metrics(
        student.user_id.clone(),
        student.display_name(),
        student.class_name.clone(),
        &percentages,
        &attendance,
        assigned.len(),
        submitted,
    ))
}

pub fn grade_percentages(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
    selection: &TermSelection,
) -> Result<Vec<f64>, ApiError> {
    match (&selection.academic_year, selection.term) {
        (Some(year), Some(term)) => {
            let mut stmt = conn.prepare(
                "SELECT percentage FROM grades
                 WHERE student_id = ? AND school_id = ? AND academic_year = ? AND term = ?",
            )?;
            stmt.query_map(
                rusqlite::params![student_id, school_id, year, term],
                |r| r.get(0),
            )
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())
            .map_err(ApiError::from)
        }
        _ => {
            let mut stmt = conn.prepare(
                "SELECT percentage FROM grades WHERE student_id = ? AND school_id = ?",
            )?;
            stmt.query_map([student_id, school_id], |r| r.get(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())
                .map_err(ApiError::from)
        }
    }
}

fn attendance_statuses(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
    selection: &TermSelection,
) -> Result<Vec<AttendanceStatus>, ApiError> {
    let raw: Vec<String> = match &selection.window {
        Some((start, end)) => {
            let mut stmt = conn.prepare(
                "SELECT status FROM attendance
                 WHERE student_id = ? AND school_id = ? AND date >= ? AND date <= ?",
            )?;
            stmt.query_map(rusqlite::params![student_id, school_id, start, end], |r| {
                r.get(0)
            })
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        }
        None => {
            let mut stmt = conn
                .prepare("SELECT status FROM attendance WHERE student_id = ? AND school_id = ?")?;
            stmt.query_map([student_id, school_id], |r| r.get(0))
                .and_then(|it| it.collect::<Result<Vec<_>, _>>())?
        }
    };
    Ok(raw
        .iter()
        .filter_map(|s| AttendanceStatus::parse(s))
        .collect())
}

fn term_json(selection: &TermSelection) -> Value {
    json!({
        "academicYear": selection.academic_year,
        "term": selection.term,
    })
}

fn performance(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let selection = select_term(conn, &principal.school_id, &req.params)?;
    let targets = AssignmentTargets::load(conn, &principal.school_id)?;

    if let Some(student_id) = optional_str(&req.params, "studentId") {
        let Some(student) = scoped_student(conn, &principal.school_id, &scope, &student_id)? else {
            return Err(ApiError::not_found("student not found"));
        };
        let m = metrics_for_student(conn, &principal.school_id, &student, &selection, &targets)?;
        return Ok(json!({
            "termSelection": term_json(&selection),
            "student": m,
        }));
    }

    let (page, limit) = page_limit(&req.params, 50)?;
    let roster = scoped_students(conn, &principal.school_id, &scope)?;
    let mut per_student: Vec<StudentMetrics> = Vec::with_capacity(roster.len());
    for student in &roster {
        per_student.push(metrics_for_student(
            conn,
            &principal.school_id,
            student,
            &selection,
            &targets,
        )?);
    }
    let summary = class_summary(&per_student);
    let (page_items, total) = paginate(per_student, page, limit);

    Ok(json!({
        "termSelection": term_json(&selection),
        "students": page_items,
        "summary": summary,
        "pagination": pagination_json(total, page, limit),
    }))
}

/// Class analytics: per-student term-over-term trend plus the class summary.
/// With no previous term to compare, the single-term trend rule applies.
fn analytics(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let selection = select_term(conn, &principal.school_id, &req.params)?;
    let targets = AssignmentTargets::load(conn, &principal.school_id)?;

    let previous_selection = match (&selection.academic_year, selection.term) {
        (Some(year), Some(term)) if term > 1 => Some(TermSelection {
            academic_year: Some(year.clone()),
            term: Some(term - 1),
            window: calendar::term_window(conn, &principal.school_id, year, term - 1)?
                .map(|w| (w.start_date, w.end_date)),
        }),
        _ => None,
    };

    let roster = scoped_students(conn, &principal.school_id, &scope)?;
    let mut per_student: Vec<StudentMetrics> = Vec::with_capacity(roster.len());
    for student in &roster {
        let mut m =
            metrics_for_student(conn, &principal.school_id, student, &selection, &targets)?;
        if let Some(prev) = &previous_selection {
            let prev_percentages =
                grade_percentages(conn, &principal.school_id, &student.user_id, prev)?;
            if !prev_percentages.is_empty() {
                m.trend = metrics::trend_between(
                    m.overall_average,
                    metrics::overall_average(&prev_percentages),
                );
            }
        }
        per_student.push(m);
    }
    let summary = class_summary(&per_student);

    Ok(json!({
        "termSelection": term_json(&selection),
        "previousTerm": previous_selection.as_ref().map(term_json),
        "students": per_student,
        "summary": summary,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.class.performance" => performance(state, req),
        "teacher.class.analytics" => analytics(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
