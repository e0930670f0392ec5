use super::handlers;
use super::types::{AppState, Request};
use crate::ipc::error::{err, ApiError};

pub fn handle_request(state: &mut AppState, req: Request) -> serde_json::Value {
    if let Some(resp) = handlers::core::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::setup::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::admin_users::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::class_students::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::class_attendance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::class_performance::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::class_alerts::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::class_reports::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::grading::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::assignments::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::messages::try_handle(state, &req) {
        return resp;
    }
    if let Some(resp) = handlers::notifications::try_handle(state, &req) {
        return resp;
    }

    err(
        &req.id,
        &ApiError::new(
            "not_implemented",
            format!("unknown method: {}", req.method),
        ),
    )
}
