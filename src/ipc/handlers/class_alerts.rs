use crate::alerts::{
    emit_alert_notifications, valid_transition, AlertContext, AlertPriority, AlertStatus, AlertType,
};
use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn_mut, filter_str, matches_search, optional_date, optional_str, page_limit, paginate,
    pagination_json, require_auth, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::scope::{scoped_student, TeacherScope};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

use super::class_students::class_teacher_scope;

/// Creates an alert and emits its notifications inside one transaction, so
/// the student-facing record and any admin escalation land together with the
/// alert row itself.
fn alerts_create(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;

    let student_id = required_str(&req.params, "studentId")?;
    let alert_type_raw = required_str(&req.params, "alertType")?;
    let Some(alert_type) = AlertType::parse(&alert_type_raw) else {
        return Err(ApiError::bad_params(format!(
            "unknown alertType: {}",
            alert_type_raw
        )));
    };
    let priority_raw = optional_str(&req.params, "priority").unwrap_or_else(|| "normal".to_string());
    let Some(priority) = AlertPriority::parse(&priority_raw) else {
        return Err(ApiError::bad_params(format!(
            "priority must be low, normal, high or urgent, got {}",
            priority_raw
        )));
    };
    let title = required_str(&req.params, "title")?;
    let description = optional_str(&req.params, "description");
    let follow_up_date = optional_date(&req.params, "followUpDate")?
        .map(|d| d.format("%Y-%m-%d").to_string());

    let Some(student) = scoped_student(conn, &principal.school_id, &scope, &student_id)? else {
        return Err(ApiError::not_found("student not found"));
    };

    let alert_id = db::new_id();
    let creator_name = principal.display_name();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO student_alerts(id, student_id, school_id, created_by, alert_type, priority,
                                    title, description, status, follow_up_date, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'active', ?, ?)",
        (
            &alert_id,
            &student.user_id,
            &principal.school_id,
            &principal.user_id,
            alert_type.as_str(),
            priority.as_str(),
            &title,
            &description,
            &follow_up_date,
            db::now_ts(),
        ),
    )?;
    let notifications_created = emit_alert_notifications(
        &tx,
        &AlertContext {
            alert_id: &alert_id,
            school_id: &principal.school_id,
            student_user_id: &student.user_id,
            student_name: &student.display_name(),
            creator_name: &creator_name,
            title: &title,
            priority,
        },
    )?;
    tx.commit()?;

    Ok(json!({
        "alertId": alert_id,
        "status": "active",
        "notificationsCreated": notifications_created,
    }))
}

#[derive(Debug, Clone)]
struct AlertRow {
    id: String,
    student_id: String,
    student_name: String,
    class_name: String,
    alert_type: String,
    priority: String,
    title: String,
    description: Option<String>,
    status: String,
    follow_up_date: Option<String>,
    created_at: String,
    resolved_at: Option<String>,
}

impl AlertRow {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "studentId": self.student_id,
            "studentName": self.student_name,
            "className": self.class_name,
            "alertType": self.alert_type,
            "priority": self.priority,
            "title": self.title,
            "description": self.description,
            "status": self.status,
            "followUpDate": self.follow_up_date,
            "createdAt": self.created_at,
            "resolvedAt": self.resolved_at,
        })
    }
}

fn load_scope_alerts(
    conn: &Connection,
    school_id: &str,
    scope: &TeacherScope,
) -> Result<Vec<AlertRow>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.student_id, u.last_name, u.first_name, sp.class_name,
                a.alert_type, a.priority, a.title, a.description, a.status,
                a.follow_up_date, a.created_at, a.resolved_at
         FROM student_alerts a
         JOIN users u ON u.id = a.student_id
         JOIN student_profiles sp ON sp.user_id = a.student_id
         WHERE a.school_id = ?
         ORDER BY a.created_at DESC",
    )?;
    let rows: Vec<(AlertRow, Option<String>)> = stmt
        .query_map([school_id], |r| {
            let last: String = r.get(2)?;
            let first: String = r.get(3)?;
            let class_name: Option<String> = r.get(4)?;
            Ok((
                AlertRow {
                    id: r.get(0)?,
                    student_id: r.get(1)?,
                    student_name: format!("{}, {}", last, first),
                    class_name: class_name.clone().unwrap_or_default(),
                    alert_type: r.get(5)?,
                    priority: r.get(6)?,
                    title: r.get(7)?,
                    description: r.get(8)?,
                    status: r.get(9)?,
                    follow_up_date: r.get(10)?,
                    created_at: r.get(11)?,
                    resolved_at: r.get(12)?,
                },
                class_name,
            ))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
    Ok(rows
        .into_iter()
        .filter(|(_, class_name)| scope.contains(class_name.as_deref()))
        .map(|(row, _)| row)
        .collect())
}

fn alerts_list(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let (page, limit) = page_limit(&req.params, 20)?;
    let status_filter = match filter_str(&req.params, "status") {
        None => None,
        Some(raw) => Some(
            AlertStatus::parse(&raw)
                .ok_or_else(|| ApiError::bad_params(format!("unknown status filter: {}", raw)))?,
        ),
    };
    let priority_filter = match filter_str(&req.params, "priority") {
        None => None,
        Some(raw) => Some(
            AlertPriority::parse(&raw)
                .ok_or_else(|| ApiError::bad_params(format!("unknown priority filter: {}", raw)))?,
        ),
    };
    let search = filter_str(&req.params, "search");

    let in_scope = load_scope_alerts(conn, &principal.school_id, &scope)?;

    // Status counts summarize the whole scoped set, not just the current page
    // or the status-filtered slice.
    let count_of = |status: &str| in_scope.iter().filter(|a| a.status == status).count();
    let summary = json!({
        "active": count_of("active"),
        "inProgress": count_of("in_progress"),
        "escalated": count_of("escalated"),
        "resolved": count_of("resolved"),
    });

    let filtered: Vec<AlertRow> = in_scope
        .into_iter()
        .filter(|a| status_filter.map(|f| a.status == f.as_str()).unwrap_or(true))
        .filter(|a| {
            priority_filter
                .map(|f| a.priority == f.as_str())
                .unwrap_or(true)
        })
        .filter(|a| {
            search
                .as_deref()
                .map(|needle| {
                    matches_search(
                        needle,
                        &[
                            &a.title,
                            a.description.as_deref().unwrap_or(""),
                            &a.student_name,
                        ],
                    )
                })
                .unwrap_or(true)
        })
        .collect();

    let (page_items, total) = paginate(filtered, page, limit);
    Ok(json!({
        "alerts": page_items.iter().map(|a| a.to_json()).collect::<Vec<_>>(),
        "summary": summary,
        "pagination": pagination_json(total, page, limit),
    }))
}

fn alerts_update_status(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let alert_id = required_str(&req.params, "alertId")?;
    let status_raw = required_str(&req.params, "status")?;
    let Some(next) = AlertStatus::parse(&status_raw) else {
        return Err(ApiError::bad_params(format!("unknown status: {}", status_raw)));
    };

    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT a.status, a.student_id FROM student_alerts a WHERE a.id = ? AND a.school_id = ?",
            [&alert_id, &principal.school_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((current_raw, student_id)) = row else {
        return Err(ApiError::not_found("alert not found"));
    };
    if scoped_student(conn, &principal.school_id, &scope, &student_id)?.is_none() {
        // Outside the caller's classes reads the same as absent.
        return Err(ApiError::not_found("alert not found"));
    }
    let current = AlertStatus::parse(&current_raw)
        .ok_or_else(|| ApiError::internal("unknown alert status at rest"))?;
    if !valid_transition(current, next) {
        return Err(ApiError::bad_params(format!(
            "cannot move alert from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }

    if next == AlertStatus::Resolved {
        conn.execute(
            "UPDATE student_alerts SET status = ?, resolved_at = ?, resolved_by = ? WHERE id = ?",
            (next.as_str(), db::now_ts(), &principal.user_id, &alert_id),
        )?;
    } else {
        conn.execute(
            "UPDATE student_alerts SET status = ? WHERE id = ?",
            (next.as_str(), &alert_id),
        )?;
    }
    Ok(json!({ "alertId": alert_id, "status": next.as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.class.alerts.create" => alerts_create(state, req),
        "teacher.class.alerts.list" => alerts_list(state, req),
        "teacher.class.alerts.updateStatus" => alerts_update_status(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
