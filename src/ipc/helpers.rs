use crate::ipc::error::ApiError;
use crate::ipc::types::{AppState, Request};
use chrono::NaiveDate;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
    Admin,
    HeadAdmin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "student" => Some(Role::Student),
            "teacher" => Some(Role::Teacher),
            "admin" => Some(Role::Admin),
            "headadmin" => Some(Role::HeadAdmin),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Admin => "admin",
            Role::HeadAdmin => "headadmin",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
    pub role: Role,
    pub school_id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Principal {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

pub fn db_conn<'a>(state: &'a AppState) -> Result<&'a Connection, ApiError> {
    state
        .db
        .as_ref()
        .ok_or_else(|| ApiError::new("no_workspace", "select a workspace first"))
}

pub fn db_conn_mut<'a>(state: &'a mut AppState) -> Result<&'a mut Connection, ApiError> {
    state
        .db
        .as_mut()
        .ok_or_else(|| ApiError::new("no_workspace", "select a workspace first"))
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Authorization precedes all data access: the session token must resolve to
/// an active user, and the user's role must be in the endpoint's allow-list.
pub fn require_auth(
    conn: &Connection,
    req: &Request,
    allowed: &[Role],
) -> Result<Principal, ApiError> {
    let token = req
        .params
        .get("sessionToken")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if token.is_empty() {
        return Err(ApiError::unauthorized());
    }
    let row: Option<(String, String, String, String, String)> = conn
        .query_row(
            "SELECT u.id, u.role, u.school_id, u.first_name, u.last_name
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             WHERE s.token = ? AND u.active = 1",
            [token],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, role_raw, school_id, first_name, last_name)) = row else {
        tracing::warn!(method = %req.method, "rejected request with unknown session token");
        return Err(ApiError::unauthorized());
    };
    let Some(role) = Role::parse(&role_raw) else {
        tracing::error!(user_id, role = %role_raw, "unknown role at rest");
        return Err(ApiError::internal("unknown role"));
    };
    if !allowed.contains(&role) {
        tracing::warn!(user_id, role = role.as_str(), method = %req.method, "role not allowed");
        return Err(ApiError::forbidden("insufficient role"));
    }
    Ok(Principal {
        user_id,
        role,
        school_id,
        first_name,
        last_name,
    })
}

/// School the request operates on: headadmins may target any school via
/// params.schoolId, everyone else is pinned to their own.
pub fn effective_school(principal: &Principal, params: &Value) -> String {
    if principal.role == Role::HeadAdmin {
        if let Some(school_id) = params.get("schoolId").and_then(|v| v.as_str()) {
            if !school_id.trim().is_empty() {
                return school_id.to_string();
            }
        }
    }
    principal.school_id.clone()
}

pub fn required_str(params: &Value, key: &str) -> Result<String, ApiError> {
    let value = params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    if value.is_empty() {
        return Err(ApiError::bad_params(format!("missing {}", key)));
    }
    Ok(value)
}

pub fn optional_str(params: &Value, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// List-endpoint filter value: absent, empty, and the literal "all" mean
/// no filter.
pub fn filter_str(params: &Value, key: &str) -> Option<String> {
    optional_str(params, key).filter(|s| !s.eq_ignore_ascii_case("all"))
}

pub fn required_f64(params: &Value, key: &str) -> Result<f64, ApiError> {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| ApiError::bad_params(format!("missing or non-numeric {}", key)))
}

pub fn optional_i64(params: &Value, key: &str) -> Option<i64> {
    params.get(key).and_then(|v| v.as_i64())
}

pub fn required_date(params: &Value, key: &str) -> Result<NaiveDate, ApiError> {
    let raw = required_str(params, key)?;
    parse_date(&raw, key)
}

pub fn optional_date(params: &Value, key: &str) -> Result<Option<NaiveDate>, ApiError> {
    match optional_str(params, key) {
        None => Ok(None),
        Some(raw) => parse_date(&raw, key).map(Some),
    }
}

pub fn parse_date(raw: &str, key: &str) -> Result<NaiveDate, ApiError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_params(format!("{} must be a YYYY-MM-DD date", key)))
}

/// Shared list-endpoint paging: page defaults to 1, limit to the endpoint's
/// default, clamped to [1,100].
pub fn page_limit(params: &Value, default_limit: i64) -> Result<(i64, i64), ApiError> {
    let page = match params.get("page") {
        None => 1,
        Some(v) if v.is_null() => 1,
        Some(v) => v
            .as_i64()
            .filter(|p| *p >= 1)
            .ok_or_else(|| ApiError::bad_params("page must be a positive integer"))?,
    };
    let limit = match params.get("limit") {
        None => default_limit,
        Some(v) if v.is_null() => default_limit,
        Some(v) => v
            .as_i64()
            .filter(|l| *l >= 1)
            .ok_or_else(|| ApiError::bad_params("limit must be a positive integer"))?,
    };
    Ok((page, limit.min(100)))
}

pub fn pages_for(total: usize, limit: i64) -> i64 {
    if total == 0 {
        0
    } else {
        ((total as i64) + limit - 1) / limit
    }
}

pub fn pagination_json(total: usize, page: i64, limit: i64) -> Value {
    json!({
        "total": total,
        "page": page,
        "limit": limit,
        "pages": pages_for(total, limit),
    })
}

/// In-memory paging over the fully filtered result set. Scope and search
/// filters run before this, so a page is never partially filtered away.
/// Absurdly large pages saturate and come back empty instead of overflowing.
pub fn paginate<T>(items: Vec<T>, page: i64, limit: i64) -> (Vec<T>, usize) {
    let total = items.len();
    let skip = (page - 1).saturating_mul(limit).max(0) as usize;
    let page_items = items
        .into_iter()
        .skip(skip)
        .take(limit as usize)
        .collect();
    (page_items, total)
}

/// Case-insensitive substring search over a fixed whitelist of fields.
pub fn matches_search(needle: &str, fields: &[&str]) -> bool {
    let needle = needle.to_lowercase();
    fields
        .iter()
        .any(|f| f.to_lowercase().contains(&needle))
}
