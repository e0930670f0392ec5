use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{db_conn, hash_password, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};
use std::path::PathBuf;

fn handle_health(state: &AppState) -> Result<Value, ApiError> {
    Ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string())
    }))
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let path = required_str(&req.params, "path").map(PathBuf::from)?;
    match db::open_db(&path) {
        Ok(conn) => {
            state.workspace = Some(path.clone());
            state.db = Some(conn);
            Ok(json!({ "workspacePath": path.to_string_lossy() }))
        }
        Err(e) => Err(ApiError::new("db_open_failed", format!("{e:?}"))),
    }
}

fn handle_login(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let school_id = required_str(&req.params, "schoolId")?;
    let email = required_str(&req.params, "email")?;
    let password = required_str(&req.params, "password")?;

    let row: Option<(String, String, String, String, String, String, String)> = conn
        .query_row(
            "SELECT id, role, school_id, first_name, last_name, password_salt, password_digest
             FROM users
             WHERE school_id = ? AND lower(email) = lower(?) AND active = 1",
            [&school_id, &email],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, role, school_id, first_name, last_name, salt, digest)) = row else {
        tracing::warn!(school_id, "login rejected: unknown or inactive user");
        return Err(ApiError::unauthorized());
    };
    if hash_password(&salt, &password) != digest {
        tracing::warn!(user_id, "login rejected: bad credentials");
        return Err(ApiError::unauthorized());
    }

    let token = db::new_id();
    conn.execute(
        "INSERT INTO sessions(token, user_id, created_at) VALUES (?, ?, ?)",
        (&token, &user_id, db::now_ts()),
    )?;
    Ok(json!({
        "sessionToken": token,
        "user": {
            "id": user_id,
            "role": role,
            "schoolId": school_id,
            "firstName": first_name,
            "lastName": last_name,
        }
    }))
}

fn handle_logout(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let token = required_str(&req.params, "sessionToken")?;
    let removed = conn.execute("DELETE FROM sessions WHERE token = ?", [&token])?;
    Ok(json!({ "loggedOut": removed > 0 }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "health" => handle_health(state),
        "workspace.select" => handle_workspace_select(state, req),
        "session.login" => handle_login(state, req),
        "session.logout" => handle_logout(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
