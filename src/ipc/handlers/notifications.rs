use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, page_limit, paginate, pagination_json, require_auth, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use serde_json::{json, Value};

const ALL_ROLES: &[Role] = &[Role::Student, Role::Teacher, Role::Admin, Role::HeadAdmin];

/// Targeted notifications for everyone; admins additionally see the
/// school-scoped broadcasts (user_id NULL) that alert escalation produces.
fn notifications_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, ALL_ROLES)?;
    let (page, limit) = page_limit(&req.params, 20)?;
    let unread_only = req
        .params
        .get("unreadOnly")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let include_broadcasts = matches!(principal.role, Role::Admin | Role::HeadAdmin);

    let mut stmt = conn.prepare(
        "SELECT id, user_id, type, priority, title, body, is_read, created_at
         FROM notifications
         WHERE (user_id = ? OR (? AND user_id IS NULL AND school_id = ?))
         ORDER BY created_at DESC",
    )?;
    let rows: Vec<Value> = stmt
        .query_map(
            rusqlite::params![principal.user_id, include_broadcasts, principal.school_id],
            |r| {
                Ok(json!({
                    "id": r.get::<_, String>(0)?,
                    "userId": r.get::<_, Option<String>>(1)?,
                    "type": r.get::<_, String>(2)?,
                    "priority": r.get::<_, String>(3)?,
                    "title": r.get::<_, String>(4)?,
                    "body": r.get::<_, String>(5)?,
                    "isRead": r.get::<_, i64>(6)? != 0,
                    "createdAt": r.get::<_, String>(7)?,
                }))
            },
        )
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let unread = rows
        .iter()
        .filter(|n| n.get("isRead").and_then(|v| v.as_bool()) == Some(false))
        .count();
    let filtered: Vec<Value> = if unread_only {
        rows.into_iter()
            .filter(|n| n.get("isRead").and_then(|v| v.as_bool()) == Some(false))
            .collect()
    } else {
        rows
    };

    let (page_items, total) = paginate(filtered, page, limit);
    Ok(json!({
        "notifications": page_items,
        "summary": { "unreadCount": unread },
        "pagination": pagination_json(total, page, limit),
    }))
}

/// Only the targeted recipient may mark a notification read; broadcasts keep
/// their shared unread state.
fn notifications_mark_read(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, ALL_ROLES)?;
    let notification_id = required_str(&req.params, "notificationId")?;
    let updated = conn.execute(
        "UPDATE notifications SET is_read = 1 WHERE id = ? AND user_id = ?",
        [&notification_id, &principal.user_id],
    )?;
    if updated == 0 {
        return Err(ApiError::not_found("notification not found"));
    }
    Ok(json!({ "read": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "notifications.list" => notifications_list(state, req),
        "notifications.markRead" => notifications_mark_read(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
