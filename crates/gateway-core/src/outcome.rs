//! Explicit control-flow result for the click/event pipeline.
//!
//! The original system used exceptions (`SafeAbort`, `SafeAbortAndResponse`)
//! to unwind out of nested lookups straight to a response. Here the same
//! short-circuiting is an ordinary return value: every dispatcher step
//! returns `Outcome`, and the caller matches on it instead of catching.

use serde::Serialize;

/// What the HTTP layer should do once a pipeline step has decided.
#[derive(Debug, Clone, Serialize)]
pub enum Outcome {
    /// 302 redirect to an app URL or offer URL.
    Redirect { to: String },
    /// Serve a landing page body, optionally setting the session cookie.
    RenderLanding { landing_id: i64, cookie: Option<String> },
    /// A typed JSON error with its own status code.
    JsonError { status: u16, message: String },
    /// Fall through to the emergency page; nothing else can be done.
    Emergency,
}

impl Outcome {
    pub fn redirect(to: impl Into<String>) -> Self {
        Outcome::Redirect { to: to.into() }
    }

    pub fn json_error(status: u16, message: impl Into<String>) -> Self {
        Outcome::JsonError {
            status,
            message: message.into(),
        }
    }
}
