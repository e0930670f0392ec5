use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, page_limit, paginate, pagination_json, require_auth, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::{class_summary, Classification, StudentMetrics, Trend};
use crate::scope::scoped_students;
use rusqlite::Connection;
use serde_json::{json, Value};

use super::class_performance::{metrics_for_student, select_term, AssignmentTargets};
use super::class_students::class_teacher_scope;

/// Deterministic remark template. The hosted product lets an AI provider
/// draft these and falls back to this template on failure; here the template
/// is the only generator.
pub fn performance_remark(m: &StudentMetrics) -> String {
    let name = m
        .display_name
        .split(',')
        .nth(1)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .unwrap_or(m.display_name.as_str());
    let standing = match m.classification {
        Classification::Excellent => "an excellent standard of work",
        Classification::Good => "a good standard of work",
        Classification::Average => "a fair standard of work",
        Classification::Poor => "work below the expected standard",
        Classification::AtRisk => "work that needs urgent attention",
    };
    let direction = match m.trend {
        Trend::Improving => "Performance is improving across terms.",
        Trend::Stable => "Performance has been steady.",
        Trend::Declining => "Performance has been declining and should be monitored.",
    };
    format!(
        "{} achieved an average of {:.1}% with {:.1}% attendance, showing {}. {}",
        name, m.overall_average, m.attendance_rate, standing, direction
    )
}

fn attendance_breakdown(
    conn: &Connection,
    school_id: &str,
    student_id: &str,
    window: Option<&(String, String)>,
) -> Result<Value, ApiError> {
    let rows: Vec<String> = match window {
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
    let count_of = |status: &str| rows.iter().filter(|s| s.as_str() == status).count();
    Ok(json!({
        "present": count_of("present"),
        "absent": count_of("absent"),
        "late": count_of("late"),
        "excused": count_of("excused"),
    }))
}

/// Term report built from the real grade, attendance and assignment tables.
fn reports(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let (page, limit) = page_limit(&req.params, 50)?;
    let selection = select_term(conn, &principal.school_id, &req.params)?;
    let targets = AssignmentTargets::load(conn, &principal.school_id)?;

    let roster = scoped_students(conn, &principal.school_id, &scope)?;
    let mut per_student: Vec<StudentMetrics> = Vec::with_capacity(roster.len());
    let mut rows: Vec<Value> = Vec::with_capacity(roster.len());
    for student in &roster {
        let m = metrics_for_student(conn, &principal.school_id, student, &selection, &targets)?;
        let open_alerts: i64 = conn.query_row(
            "SELECT COUNT(*) FROM student_alerts
             WHERE student_id = ? AND school_id = ? AND status IN ('active','in_progress','escalated')",
            [&student.user_id, &principal.school_id],
            |r| r.get(0),
        )?;
        let breakdown = attendance_breakdown(
            conn,
            &principal.school_id,
            &student.user_id,
            selection.window.as_ref(),
        )?;
        rows.push(json!({
            "studentId": m.student_id,
            "displayName": m.display_name,
            "className": m.class_name,
            "overallAverage": m.overall_average,
            "attendanceRate": m.attendance_rate,
            "assignmentCompletion": m.assignment_completion,
            "gradeCount": m.grade_count,
            "classification": m.classification,
            "trend": m.trend,
            "openAlerts": open_alerts,
            "attendanceBreakdown": breakdown,
            "remark": performance_remark(&m),
        }));
        per_student.push(m);
    }
    let summary = class_summary(&per_student);
    let (page_items, total) = paginate(rows, page, limit);

    Ok(json!({
        "termSelection": {
            "academicYear": selection.academic_year,
            "term": selection.term,
        },
        "students": page_items,
        "summary": summary,
        "pagination": pagination_json(total, page, limit),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.class.reports" => reports(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
