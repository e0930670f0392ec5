use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn_mut, filter_str, optional_date, optional_str, page_limit, paginate, pagination_json,
    require_auth, required_date, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::metrics::AttendanceStatus;
use crate::scope::{scoped_student, scoped_students};
use serde_json::{json, Value};

use super::class_students::class_teacher_scope;

/// Bulk-records one day of attendance for students in the caller's classes.
/// Re-marking a student for the same day overwrites the earlier status.
fn attendance_record(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let date = required_date(&req.params, "date")?;
    let Some(raw_entries) = req.params.get("entries").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("missing entries array"));
    };
    if raw_entries.is_empty() {
        return Err(ApiError::bad_params("entries must not be empty"));
    }

    let mut entries: Vec<(String, AttendanceStatus)> = Vec::with_capacity(raw_entries.len());
    for entry in raw_entries {
        let Some(student_id) = entry.get("studentId").and_then(|v| v.as_str()) else {
            return Err(ApiError::bad_params("entries require studentId"));
        };
        let Some(status_raw) = entry.get("status").and_then(|v| v.as_str()) else {
            return Err(ApiError::bad_params("entries require status"));
        };
        let Some(status) = AttendanceStatus::parse(status_raw) else {
            return Err(ApiError::bad_params(format!(
                "status must be present, absent, late or excused, got {}",
                status_raw
            )));
        };
        entries.push((student_id.to_string(), status));
    }

    // Every target must be inside the caller's class scope before anything
    // is written; out-of-scope ids read as absent records.
    for (student_id, _) in &entries {
        if scoped_student(conn, &principal.school_id, &scope, student_id)?.is_none() {
            return Err(ApiError::not_found("student not found"));
        }
    }

    let date_key = date.format("%Y-%m-%d").to_string();
    let tx = conn.transaction()?;
    for (student_id, status) in &entries {
        tx.execute(
            "INSERT INTO attendance(id, student_id, school_id, date, status, marked_by)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(student_id, date) DO UPDATE SET
                status = excluded.status,
                marked_by = excluded.marked_by",
            (
                db::new_id(),
                student_id,
                &principal.school_id,
                &date_key,
                status.as_str(),
                &principal.user_id,
            ),
        )?;
    }
    tx.commit()?;

    Ok(json!({ "date": date_key, "recorded": entries.len() }))
}

fn attendance_list(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let (page, limit) = page_limit(&req.params, 50)?;
    let date = optional_date(&req.params, "date")?;
    let student_id = optional_str(&req.params, "studentId");
    let status_filter = match filter_str(&req.params, "status") {
        None => None,
        Some(raw) => Some(AttendanceStatus::parse(&raw).ok_or_else(|| {
            ApiError::bad_params(format!("unknown status filter: {}", raw))
        })?),
    };

    let in_scope: Vec<_> = match &student_id {
        Some(id) => {
            let Some(s) = scoped_student(conn, &principal.school_id, &scope, id)? else {
                return Err(ApiError::not_found("student not found"));
            };
            vec![s]
        }
        None => scoped_students(conn, &principal.school_id, &scope)?,
    };
    if in_scope.is_empty() {
        return Ok(json!({
            "records": [],
            "pagination": pagination_json(0, page, limit),
        }));
    }

    let mut records: Vec<Value> = Vec::new();
    let mut stmt = conn.prepare(
        "SELECT date, status, marked_by
         FROM attendance
         WHERE student_id = ? AND school_id = ?
         ORDER BY date DESC",
    )?;
    for student in &in_scope {
        let rows: Vec<(String, String, String)> = stmt
            .query_map([&student.user_id, &principal.school_id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        for (row_date, row_status, marked_by) in rows {
            if let Some(d) = &date {
                if row_date != d.format("%Y-%m-%d").to_string() {
                    continue;
                }
            }
            if let Some(f) = status_filter {
                if row_status != f.as_str() {
                    continue;
                }
            }
            records.push(json!({
                "studentId": student.user_id,
                "displayName": student.display_name(),
                "className": student.class_name,
                "date": row_date,
                "status": row_status,
                "markedBy": marked_by,
            }));
        }
    }
    records.sort_by(|a, b| {
        let da = a.get("date").and_then(|v| v.as_str()).unwrap_or("");
        let db_ = b.get("date").and_then(|v| v.as_str()).unwrap_or("");
        db_.cmp(da)
    });

    let (page_items, total) = paginate(records, page, limit);
    Ok(json!({
        "records": page_items,
        "pagination": pagination_json(total, page, limit),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.class.attendance.record" => attendance_record(state, req),
        "teacher.class.attendance.list" => attendance_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
