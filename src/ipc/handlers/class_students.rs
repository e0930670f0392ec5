use crate::ipc::error::{respond, ApiError};
use crate::ipc::helpers::{
    db_conn, filter_str, matches_search, page_limit, paginate, pagination_json, require_auth, Role,
};
use crate::ipc::types::{AppState, Request};
use crate::scope::{resolve_teacher_scope, scoped_students, TeacherScope};
use rusqlite::Connection;
use serde_json::{json, Value};

/// Resolves the caller as a class-leading teacher and returns their scope.
/// Subject teachers get the class endpoints refused outright.
pub fn class_teacher_scope(
    conn: &Connection,
    teacher_user_id: &str,
) -> Result<TeacherScope, ApiError> {
    let (department, scope) = resolve_teacher_scope(conn, teacher_user_id)?;
    if !department.leads_class() {
        return Err(ApiError::forbidden(
            "class endpoints require a class-teacher, coordinator or director role",
        ));
    }
    Ok(scope)
}

fn students_list(state: &AppState, req: &Request) -> Result<Value, ApiError> {
    let conn = db_conn(state)?;
    let principal = require_auth(conn, req, &[Role::Teacher])?;
    let scope = class_teacher_scope(conn, &principal.user_id)?;
    let (page, limit) = page_limit(&req.params, 20)?;
    let search = filter_str(&req.params, "search");

    if scope.is_empty() {
        // No assigned classes: an empty roster, not an unfiltered query.
        return Ok(json!({
            "students": [],
            "classes": [],
            "pagination": pagination_json(0, page, limit),
        }));
    }

    let roster = scoped_students(conn, &principal.school_id, &scope)?;
    let filtered: Vec<_> = roster
        .into_iter()
        .filter(|s| {
            search
                .as_deref()
                .map(|needle| {
                    matches_search(
                        needle,
                        &[
                            &s.first_name,
                            &s.last_name,
                            &s.class_name,
                            s.student_no.as_deref().unwrap_or(""),
                        ],
                    )
                })
                .unwrap_or(true)
        })
        .collect();

    let (page_items, total) = paginate(filtered, page, limit);
    let students: Vec<Value> = page_items
        .iter()
        .map(|s| {
            json!({
                "id": s.user_id,
                "firstName": s.first_name,
                "lastName": s.last_name,
                "displayName": s.display_name(),
                "className": s.class_name,
                "studentNo": s.student_no,
            })
        })
        .collect();

    Ok(json!({
        "students": students,
        "classes": scope.classes,
        "pagination": pagination_json(total, page, limit),
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let out = match req.method.as_str() {
        "teacher.class.students" => students_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, out))
}
