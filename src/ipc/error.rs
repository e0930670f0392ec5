use serde_json::{json, Value};

/// Handler-boundary error. `code` is the machine-stable wire string and
/// `status` the HTTP status a transport shim would map it to.
#[derive(Debug)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("unauthorized", "Unauthorized")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    /// Out-of-scope records deliberately report not_found rather than
    /// forbidden, so callers cannot probe for records outside their scope.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", message)
    }

    pub fn status(&self) -> u16 {
        match self.code {
            "bad_params" => 400,
            "unauthorized" => 401,
            "forbidden" => 403,
            "not_found" => 404,
            "timeout" => 408,
            "conflict" => 409,
            _ => 500,
        }
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(f, ref msg) = e {
            match f.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    tracing::warn!(error = %e, "database busy past its wait bound");
                    return ApiError::new("timeout", "database busy");
                }
                rusqlite::ErrorCode::ConstraintViolation => {
                    return ApiError::conflict(
                        msg.clone().unwrap_or_else(|| "constraint violation".to_string()),
                    );
                }
                _ => {}
            }
        }
        tracing::error!(error = %e, "unexpected database error");
        let mut out = ApiError::internal("internal error");
        if cfg!(debug_assertions) {
            out.details = Some(json!(e.to_string()));
        }
        out
    }
}

pub fn ok(id: &str, result: Value) -> Value {
    json!({
        "id": id,
        "ok": true,
        "result": result
    })
}

pub fn err(id: &str, e: &ApiError) -> Value {
    let mut error = json!({
        "code": e.code,
        "status": e.status(),
        "message": e.message,
    });
    if let Some(d) = &e.details {
        error["details"] = d.clone();
    }
    json!({
        "id": id,
        "ok": false,
        "error": error,
    })
}

pub fn respond(id: &str, out: Result<Value, ApiError>) -> Value {
    match out {
        Ok(result) => ok(id, result),
        Err(e) => err(id, &e),
    }
}
