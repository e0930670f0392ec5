use crate::calendar;
use crate::db;
use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, db_conn_mut, effective_school, hash_password, optional_str, require_auth,
    required_date, required_str, Role,
};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::{json, Value};

/// Bootstrap: creates a school together with its first admin account. Runs
/// without a session; the sidecar's host shell is the trust boundary here,
/// the same way workspace selection is.
fn school_create(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let name = required_str(&req.params, "name")?;
    let admin_email = required_str(&req.params, "adminEmail")?;
    let admin_password = required_str(&req.params, "adminPassword")?;
    let admin_first = optional_str(&req.params, "adminFirstName").unwrap_or_else(|| "School".to_string());
    let admin_last = optional_str(&req.params, "adminLastName").unwrap_or_else(|| "Admin".to_string());
    let admin_role = match optional_str(&req.params, "adminRole").as_deref() {
        None | Some("admin") => Role::Admin,
        Some("headadmin") => Role::HeadAdmin,
        Some(other) => {
            return Err(ApiError::bad_params(format!(
                "adminRole must be admin or headadmin, got {}",
                other
            )))
        }
    };

    let school_id = db::new_id();
    let admin_id = db::new_id();
    let salt = db::new_id();
    let digest = hash_password(&salt, &admin_password);

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO schools(id, name, created_at) VALUES (?, ?, ?)",
        (&school_id, &name, db::now_ts()),
    )?;
    tx.execute(
        "INSERT INTO users(id, school_id, role, email, username, first_name, last_name,
                           password_salt, password_digest, active, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?)",
        (
            &admin_id,
            &school_id,
            admin_role.as_str(),
            &admin_email,
            &admin_email,
            &admin_first,
            &admin_last,
            &salt,
            &digest,
            db::now_ts(),
        ),
    )?;
    tx.commit()?;

    Ok(json!({ "schoolId": school_id, "adminUserId": admin_id }))
}

fn subject_create(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Admin, Role::HeadAdmin])?;
    let school_id = effective_school(&principal, &req.params);
    let name = required_str(&req.params, "name")?;
    let code = required_str(&req.params, "code")?;

    let dup: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects WHERE school_id = ? AND lower(code) = lower(?)",
            [&school_id, &code],
            |r| r.get(0),
        )
        .optional()?;
    if dup.is_some() {
        return Err(ApiError::conflict(format!(
            "subject code {} already exists in this school",
            code
        )));
    }

    let subject_id = db::new_id();
    conn.execute(
        "INSERT INTO subjects(id, school_id, name, code) VALUES (?, ?, ?, ?)",
        (&subject_id, &school_id, &name, &code),
    )?;
    Ok(json!({ "subjectId": subject_id }))
}

/// Replaces the class list a teacher carries for one subject.
fn teacher_subject_set(state: &mut AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn_mut(state)?;
    let principal = require_auth(conn, req, &[Role::Admin, Role::HeadAdmin])?;
    let school_id = effective_school(&principal, &req.params);
    let teacher_id = required_str(&req.params, "teacherId")?;
    let subject_id = required_str(&req.params, "subjectId")?;
    let Some(raw_classes) = req.params.get("classes").and_then(|v| v.as_array()) else {
        return Err(ApiError::bad_params("missing classes array"));
    };
    let mut classes: Vec<String> = Vec::new();
    for v in raw_classes {
        let Some(s) = v.as_str() else {
            return Err(ApiError::bad_params("classes must contain only strings"));
        };
        let t = s.trim();
        if !t.is_empty() {
            classes.push(t.to_string());
        }
    }

    let teacher_ok: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE id = ? AND school_id = ? AND role = 'teacher' AND active = 1",
            [&teacher_id, &school_id],
            |r| r.get(0),
        )
        .optional()?;
    if teacher_ok.is_none() {
        return Err(ApiError::not_found("teacher not found"));
    }
    let subject_ok: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM subjects WHERE id = ? AND school_id = ?",
            [&subject_id, &school_id],
            |r| r.get(0),
        )
        .optional()?;
    if subject_ok.is_none() {
        return Err(ApiError::not_found("subject not found"));
    }

    let classes_json = serde_json::to_string(&classes)
        .map_err(|e| ApiError::internal(format!("encode classes: {}", e)))?;
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM teacher_subjects WHERE teacher_id = ? AND subject_id = ?",
        [&teacher_id, &subject_id],
    )?;
    tx.execute(
        "INSERT INTO teacher_subjects(id, teacher_id, subject_id, classes_json) VALUES (?, ?, ?, ?)",
        (db::new_id(), &teacher_id, &subject_id, &classes_json),
    )?;
    tx.commit()?;

    Ok(json!({ "teacherId": teacher_id, "subjectId": subject_id, "classes": classes }))
}

fn term_set(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Admin, Role::HeadAdmin])?;
    let school_id = effective_school(&principal, &req.params);
    let academic_year = required_str(&req.params, "academicYear")?;
    let term = req
        .params
        .get("term")
        .and_then(|v| v.as_i64())
        .filter(|t| (1..=3).contains(t))
        .ok_or_else(|| ApiError::bad_params("term must be 1, 2 or 3"))?;
    let start_date = required_date(&req.params, "startDate")?;
    let end_date = required_date(&req.params, "endDate")?;
    if end_date < start_date {
        return Err(ApiError::bad_params("endDate must not precede startDate"));
    }

    calendar::set_term(conn, &school_id, &academic_year, term, start_date, end_date)?;
    Ok(json!({
        "schoolId": school_id,
        "academicYear": academic_year,
        "term": term,
    }))
}

fn terms_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(
        conn,
        req,
        &[Role::Student, Role::Teacher, Role::Admin, Role::HeadAdmin],
    )?;
    let school_id = effective_school(&principal, &req.params);
    let terms = calendar::list_terms(conn, &school_id)?;
    Ok(json!({ "terms": terms }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "setup.school.create" => school_create(state, req),
        "setup.subject.create" => subject_create(state, req),
        "setup.teacherSubject.set" => teacher_subject_set(state, req),
        "setup.term.set" => term_set(state, req),
        "calendar.terms" => terms_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
