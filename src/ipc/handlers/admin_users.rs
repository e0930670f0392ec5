use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, db_conn_mut, effective_school, filter_str, hash_password, matches_search,
    optional_str, page_limit, paginate, pagination_json, require_auth, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::scope::{normalize_class_name, Department};
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};

const ADMIN_ROLES: &[Role] = &[Role::Admin, Role::HeadAdmin];

#[derive(Debug, Clone)]
struct UserRow {
    id: String,
    role: String,
    email: String,
    username: String,
    first_name: String,
    last_name: String,
    active: bool,
    created_at: String,
    class_name: Option<String>,
    student_no: Option<String>,
    department: Option<String>,
}

impl UserRow {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "role": self.role,
            "email": self.email,
            "username": self.username,
            "firstName": self.first_name,
            "lastName": self.last_name,
            "active": self.active,
            "createdAt": self.created_at,
            "className": self.class_name,
            "studentNo": self.student_no,
            "department": self.department,
        })
    }
}

fn load_user(conn: &Connection, school_id: &str, user_id: &str) -> Result<Option<UserRow>, ApiError> {
    let row = conn
        .query_row(
            "SELECT u.id, u.role, u.email, u.username, u.first_name, u.last_name, u.active,
                    u.created_at, sp.class_name, sp.student_no, tp.department
             FROM users u
             LEFT JOIN student_profiles sp ON sp.user_id = u.id
             LEFT JOIN teacher_profiles tp ON tp.user_id = u.id
             WHERE u.id = ? AND u.school_id = ?",
            [user_id, school_id],
            |r| {
                Ok(UserRow {
                    id: r.get(0)?,
                    role: r.get(1)?,
                    email: r.get(2)?,
                    username: r.get(3)?,
                    first_name: r.get(4)?,
                    last_name: r.get(5)?,
                    active: r.get::<_, i64>(6)? != 0,
                    created_at: r.get(7)?,
                    class_name: r.get(8)?,
                    student_no: r.get(9)?,
                    department: r.get(10)?,
                })
            },
        )
        .optional()?;
    Ok(row)
}

fn users_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, ADMIN_ROLES)?;
    let school_id = effective_school(&principal, &req.params);
    let (page, limit) = page_limit(&req.params, 20)?;
    let role_filter = filter_str(&req.params, "role");
    let status_filter = filter_str(&req.params, "status");
    let search = filter_str(&req.params, "search");

    if let Some(role) = &role_filter {
        if Role::parse(role).is_none() {
            return Err(ApiError::bad_params(format!("unknown role filter: {}", role)));
        }
    }
    let active_filter = match status_filter.as_deref() {
        None => None,
        Some("active") => Some(true),
        Some("inactive") => Some(false),
        Some(other) => {
            return Err(ApiError::bad_params(format!(
                "status must be all, active or inactive, got {}",
                other
            )))
        }
    };

    let mut stmt = conn.prepare(
        "SELECT u.id, u.role, u.email, u.username, u.first_name, u.last_name, u.active,
                u.created_at, sp.class_name, sp.student_no, tp.department
         FROM users u
         LEFT JOIN student_profiles sp ON sp.user_id = u.id
         LEFT JOIN teacher_profiles tp ON tp.user_id = u.id
         WHERE u.school_id = ?
         ORDER BY u.last_name, u.first_name",
    )?;
    let rows: Vec<UserRow> = stmt
        .query_map([&school_id], |r| {
            Ok(UserRow {
                id: r.get(0)?,
                role: r.get(1)?,
                email: r.get(2)?,
                username: r.get(3)?,
                first_name: r.get(4)?,
                last_name: r.get(5)?,
                active: r.get::<_, i64>(6)? != 0,
                created_at: r.get(7)?,
                class_name: r.get(8)?,
                student_no: r.get(9)?,
                department: r.get(10)?,
            })
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;

    let filtered: Vec<UserRow> = rows
        .into_iter()
        .filter(|u| role_filter.as_deref().map(|f| u.role == f).unwrap_or(true))
        .filter(|u| active_filter.map(|f| u.active == f).unwrap_or(true))
        .filter(|u| {
            search
                .as_deref()
                .map(|needle| {
                    matches_search(
                        needle,
                        &[&u.first_name, &u.last_name, &u.email, &u.username],
                    )
                })
                .unwrap_or(true)
        })
        .collect();

    let (page_items, total) = paginate(filtered, page, limit);
    Ok(json!({
        "users": page_items.iter().map(|u| u.to_json()).collect::<Vec<_>>(),
        "pagination": pagination_json(total, page, limit),
    }))
}

fn check_duplicate(
    conn: &Connection,
    school_id: &str,
    email: &str,
    username: &str,
    exclude_user_id: Option<&str>,
) -> Result<(), ApiError> {
    let dup: Option<String> = conn
        .query_row(
            "SELECT id FROM users
             WHERE school_id = ? AND (lower(email) = lower(?) OR lower(username) = lower(?))",
            [school_id, email, username],
            |r| r.get(0),
        )
        .optional()?;
    match dup {
        Some(id) if Some(id.as_str()) != exclude_user_id => Err(ApiError::conflict(
            "email or username already in use in this school",
        )),
        _ => Ok(()),
    }
}

fn write_student_profile(conn: &Connection, user_id: &str, profile: &Value) -> Result<(), ApiError> {
    let class_name = optional_str(profile, "className");
    let canonical = normalize_class_name(class_name.as_deref());
    conn.execute(
        "INSERT INTO student_profiles(user_id, class_name, class_name_canonical, student_no, parent_name, parent_phone)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
            class_name = excluded.class_name,
            class_name_canonical = excluded.class_name_canonical,
            student_no = excluded.student_no,
            parent_name = excluded.parent_name,
            parent_phone = excluded.parent_phone",
        (
            user_id,
            &class_name,
            if canonical.is_empty() { None } else { Some(canonical) },
            optional_str(profile, "studentNo"),
            optional_str(profile, "parentName"),
            optional_str(profile, "parentPhone"),
        ),
    )?;
    Ok(())
}

fn write_teacher_profile(conn: &Connection, user_id: &str, profile: &Value) -> Result<(), ApiError> {
    let department = required_str(profile, "department")?;
    if Department::parse(&department).is_none() {
        return Err(ApiError::bad_params(format!(
            "unknown department: {}",
            department
        )));
    }
    conn.execute(
        "INSERT INTO teacher_profiles(user_id, department, coordinator_class)
         VALUES (?, ?, ?)
         ON CONFLICT(user_id) DO UPDATE SET
            department = excluded.department,
            coordinator_class = excluded.coordinator_class",
        (
            user_id,
            &department,
            optional_str(profile, "coordinatorClass"),
        ),
    )?;
    Ok(())
}

fn users_create(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, ADMIN_ROLES)?;
    let school_id = effective_school(&principal, &req.params);

    let role_raw = required_str(&req.params, "role")?;
    let role = Role::parse(&role_raw)
        .ok_or_else(|| ApiError::bad_params(format!("unknown role: {}", role_raw)))?;
    if role == Role::HeadAdmin && principal.role != Role::HeadAdmin {
        return Err(ApiError::forbidden("only a headadmin may create headadmins"));
    }
    let email = required_str(&req.params, "email")?;
    let username = optional_str(&req.params, "username").unwrap_or_else(|| email.clone());
    let password = required_str(&req.params, "password")?;
    let first_name = required_str(&req.params, "firstName")?;
    let last_name = required_str(&req.params, "lastName")?;
    let profile = req.params.get("profile").cloned().unwrap_or_else(|| json!({}));

    check_duplicate(conn, &school_id, &email, &username, None)?;

    let user_id = db::new_id();
    let salt = db::new_id();
    let digest = hash_password(&salt, &password);

    // User row plus role profile land together or not at all.
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO users(id, school_id, role, email, username, first_name, last_name,
                           password_salt, password_digest, active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &user_id,
            &school_id,
            role.as_str(),
            &email,
            &username,
            &first_name,
            &last_name,
            &salt,
            &digest,
            db::now_ts(),
        ),
    )?;
    match role {
        Role::Student => write_student_profile(&tx, &user_id, &profile)?,
        Role::Teacher => write_teacher_profile(&tx, &user_id, &profile)?,
        Role::Admin | Role::HeadAdmin => {}
    }
    tx.commit()?;

    Ok(json!({ "userId": user_id }))
}

fn users_get(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, ADMIN_ROLES)?;
    let school_id = effective_school(&principal, &req.params);
    let user_id = required_str(&req.params, "userId")?;

    let Some(user) = load_user(conn, &school_id, &user_id)? else {
        return Err(ApiError::not_found("user not found"));
    };

    let mut out = user.to_json();
    if user.role == "teacher" {
        let mut stmt = conn.prepare(
            "SELECT ts.subject_id, s.name, s.code, ts.classes_json
             FROM teacher_subjects ts
             JOIN subjects s ON s.id = ts.subject_id
             WHERE ts.teacher_id = ?",
        )?;
        let subjects: Vec<Value> = stmt
            .query_map([&user_id], |r| {
                let classes_json: String = r.get(3)?;
                Ok(json!({
                    "subjectId": r.get::<_, String>(0)?,
                    "name": r.get::<_, String>(1)?,
                    "code": r.get::<_, String>(2)?,
                    "classes": serde_json::from_str::<Vec<String>>(&classes_json).unwrap_or_default(),
                }))
            })
            .and_then(|it| it.collect::<Result<Vec<_>, _>>())?;
        out["subjects"] = json!(subjects);
    }
    Ok(json!({ "user": out }))
}

/// Updates the user row, replaces the role profile, and (for teachers)
/// replaces subject assignments, all inside one transaction so partial
/// writes are never visible.
fn users_update(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, ADMIN_ROLES)?;
    let school_id = effective_school(&principal, &req.params);
    let user_id = required_str(&req.params, "userId")?;

    let Some(existing) = load_user(conn, &school_id, &user_id)? else {
        return Err(ApiError::not_found("user not found"));
    };

    let email = optional_str(&req.params, "email").unwrap_or_else(|| existing.email.clone());
    let username =
        optional_str(&req.params, "username").unwrap_or_else(|| existing.username.clone());
    if !email.eq_ignore_ascii_case(&existing.email)
        || !username.eq_ignore_ascii_case(&existing.username)
    {
        check_duplicate(conn, &school_id, &email, &username, Some(&user_id))?;
    }
    let first_name =
        optional_str(&req.params, "firstName").unwrap_or_else(|| existing.first_name.clone());
    let last_name =
        optional_str(&req.params, "lastName").unwrap_or_else(|| existing.last_name.clone());
    let active = req
        .params
        .get("active")
        .and_then(|v| v.as_bool())
        .unwrap_or(existing.active);

    let tx = conn.transaction()?;
    tx.execute(
        "UPDATE users SET email = ?, username = ?, first_name = ?, last_name = ?, active = ?
         WHERE id = ?",
        (&email, &username, &first_name, &last_name, active as i64, &user_id),
    )?;
    if let Some(password) = optional_str(&req.params, "password") {
        let salt = db::new_id();
        let digest = hash_password(&salt, &password);
        tx.execute(
            "UPDATE users SET password_salt = ?, password_digest = ? WHERE id = ?",
            (&salt, &digest, &user_id),
        )?;
    }
    if let Some(profile) = req.params.get("profile") {
        match existing.role.as_str() {
            "student" => write_student_profile(&tx, &user_id, profile)?,
            "teacher" => write_teacher_profile(&tx, &user_id, profile)?,
            _ => {}
        }
    }
    if let Some(subjects) = req.params.get("subjects").and_then(|v| v.as_array()) {
        if existing.role != "teacher" {
            return Err(ApiError::bad_params(
                "subjects may only be set on teacher accounts",
            ));
        }
        tx.execute("DELETE FROM teacher_subjects WHERE teacher_id = ?", [&user_id])?;
        for entry in subjects {
            let subject_id = required_str(entry, "subjectId")?;
            let subject_ok: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM subjects WHERE id = ? AND school_id = ?",
                    [&subject_id, &school_id],
                    |r| r.get(0),
                )
                .optional()?;
            if subject_ok.is_none() {
                return Err(ApiError::not_found("subject not found"));
            }
            let classes: Vec<String> = entry
                .get("classes")
                .and_then(|v| v.as_array())
                .map(|arr| {
                    arr.iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default();
            let classes_json = serde_json::to_string(&classes)
                .map_err(|e| ApiError::internal(format!("encode classes: {}", e)))?;
            tx.execute(
                "INSERT INTO teacher_subjects(id, teacher_id, subject_id, classes_json)
                 VALUES (?, ?, ?, ?)",
                (db::new_id(), &user_id, &subject_id, &classes_json),
            )?;
        }
    }
    if !active {
        tx.execute("DELETE FROM sessions WHERE user_id = ?", [&user_id])?;
    }
    tx.commit()?;

    let updated = load_user(conn, &school_id, &user_id)?
        .ok_or_else(|| ApiError::internal("user vanished during update"))?;
    Ok(json!({ "user": updated.to_json() }))
}

/// Deactivation rather than a destructive delete: the row keeps its history
/// but every session is revoked.
fn users_delete(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, ADMIN_ROLES)?;
    let school_id = effective_school(&principal, &req.params);
    let user_id = required_str(&req.params, "userId")?;

    if load_user(conn, &school_id, &user_id)?.is_none() {
        return Err(ApiError::not_found("user not found"));
    }

    let tx = conn.transaction()?;
    tx.execute("UPDATE users SET active = 0 WHERE id = ?", [&user_id])?;
    tx.execute("DELETE FROM sessions WHERE user_id = ?", [&user_id])?;
    tx.commit()?;
    Ok(json!({ "deactivated": true }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "admin.users.list" => users_list(state, req),
        "admin.users.create" => users_create(state, req),
        "admin.users.get" => users_get(state, req),
        "admin.users.update" => users_update(state, req),
        "admin.users.delete" => users_delete(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
