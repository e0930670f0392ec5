use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn_mut, filter_str, matches_search, optional_str, page_limit, paginate, pagination_json,
    require_auth, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

const ALL_ROLES: &[Role] = &[Role::Student, Role::Teacher, Role::Admin, Role::HeadAdmin];

fn messages_list(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, ALL_ROLES)?;
    let (page, limit) = page_limit(&req.params, 20)?;
    let mailbox = optional_str(&req.params, "box").unwrap_or_else(|| "inbox".to_string());
    let search = filter_str(&req.params, "search");

    let sql = match mailbox.as_str() {
        "inbox" => {
            "SELECT m.id, m.sender_id, m.recipient_id, su.first_name, su.last_name,
                    ru.first_name, ru.last_name, m.subject, m.body, m.is_read, m.created_at
             FROM messages m
             JOIN users su ON su.id = m.sender_id
             JOIN users ru ON ru.id = m.recipient_id
             WHERE m.recipient_id = ?
             ORDER BY m.created_at DESC"
        }
        "sent" => {
            "SELECT m.id, m.sender_id, m.recipient_id, su.first_name, su.last_name,
                    ru.first_name, ru.last_name, m.subject, m.body, m.is_read, m.created_at
             FROM messages m
             JOIN users su ON su.id = m.sender_id
             JOIN users ru ON ru.id = m.recipient_id
             WHERE m.sender_id = ?
             ORDER BY m.created_at DESC"
        }
        other => {
            return Err(ApiError::bad_params(format!(
                "box must be inbox or sent, got {}",
                other
            )))
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows: Vec<Value> = stmt
        .query_map([&principal.user_id], |r| {
            let sender_first: String = r.get(3)?;
            let sender_last: String = r.get(4)?;
            let recipient_first: String = r.get(5)?;
            let recipient_last: String = r.get(6)?;
            Ok(json!({
                "id": r.get::<_, String>(0)?,
                "senderId": r.get::<_, String>(1)?,
                "recipientId": r.get::<_, String>(2)?,
                "senderName": format!("{} {}", sender_first, sender_last),
                "recipientName": format!("{} {}", recipient_first, recipient_last),
                "subject": r.get::<_, String>(7)?,
                "body": r.get::<_, String>(8)?,
                "isRead": r.get::<_, i64>(9)? != 0,
                "createdAt": r.get::<_, String>(10)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let filtered: Vec<Value> = rows
        .into_iter()
        .filter(|m| {
            search
                .as_deref()
                .map(|needle| {
                    matches_search(
                        needle,
                        &[
                            m.get("subject").and_then(|v| v.as_str()).unwrap_or(""),
                            m.get("body").and_then(|v| v.as_str()).unwrap_or(""),
                            m.get("senderName").and_then(|v| v.as_str()).unwrap_or(""),
                        ],
                    )
                })
                .unwrap_or(true)
        })
        .collect();

    let (page_items, total) = paginate(filtered, page, limit);
    Ok(json!({
        "messages": page_items,
        "pagination": pagination_json(total, page, limit),
    }))
}

/// Sends a message and relays it as a notification to the recipient, in one
/// transaction.
fn messages_send(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, ALL_ROLES)?;
    let recipient_id = required_str(&req.params, "recipientId")?;
    let subject = required_str(&req.params, "subject")?;
    let body = required_str(&req.params, "body")?;

    let recipient_ok: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ? AND school_id = ? AND active = 1",
            [&recipient_id, &principal.school_id],
            |r| r.get(0),
        )
        .optional()?;
    if recipient_ok.is_none() {
        return Err(ApiError::not_found("recipient not found"));
    }

    let message_id = db::new_id();
    let sender_name = principal.display_name();
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO messages(id, school_id, sender_id, recipient_id, subject, body, is_read, created_at)
         VALUES (?, ?, ?, ?, ?, ?, 0, ?)",
        (
            &message_id,
            &principal.school_id,
            &principal.user_id,
            &recipient_id,
            &subject,
            &body,
            db::now_ts(),
        ),
    )?;
    tx.execute(
        "INSERT INTO notifications(id, user_id, school_id, type, priority, title, body, is_read, created_at)
         VALUES (?, ?, ?, 'message', 'normal', ?, ?, 0, ?)",
        (
            db::new_id(),
            &recipient_id,
            &principal.school_id,
            format!("New message from {}", sender_name),
            &subject,
            db::now_ts(),
        ),
    )?;
    tx.commit()?;

    Ok(json!({ "messageId": message_id }))
}

fn messages_mark_read(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, ALL_ROLES)?;
    let message_id = required_str(&req.params, "messageId")?;
    let updated = conn.execute(
        "UPDATE messages SET is_read = 1 WHERE id = ? AND recipient_id = ?",
        [&message_id, &principal.user_id],
    )?;
    if updated == 0 {
        return Err(ApiError::not_found("message not found"));
    }
    Ok(json!({ "read": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "student.messages.list" => messages_list(state, req),
        "student.messages.send" => messages_send(state, req),
        "student.messages.markRead" => messages_mark_read(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
