//! Converts a pipeline `Outcome` into an HTTP response.
//!
//! Mirrors the original `CampaignClickController.error_response` plus the
//! redirect/landing/emergency branches of `handle_web_click` /
//! `handle_app_click`, collapsed into one match instead of being scattered
//! across `SafeAbort` handlers.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use gateway_core::Outcome;
use serde_json::json;

pub fn redirect(to: &str) -> Response {
    Response::builder()
        .status(StatusCode::FOUND)
        .header(header::LOCATION, to)
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

pub fn json_error(status: u16, message: &str) -> Response {
    let code = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (code, axum::Json(json!({ "error": message }))).into_response()
}

pub fn emergency(body: String) -> Response {
    (StatusCode::OK, axum::response::Html(body)).into_response()
}

/// Handles every `Outcome` variant except `RenderLanding`, which needs a
/// file-system lookup the caller performs first.
pub fn simple_outcome(outcome: Outcome, emergency_page: &str) -> Response {
    match outcome {
        Outcome::Redirect { to } => redirect(&to),
        Outcome::JsonError { status, message } => json_error(status, &message),
        Outcome::Emergency => emergency(emergency_page.to_string()),
        Outcome::RenderLanding { .. } => emergency(emergency_page.to_string()),
    }
}
