//! Route handlers: host-based click/beacon dispatch (C1+C4+C5), the
//! landing asset server (C7), the emergency page, and the conversion
//! beacon page.

use crate::extractor::{build_app_event, build_web_event, host_header};
use crate::response;
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use gateway_core::Outcome;
use gateway_dispatch::landing_cookie;
use std::collections::BTreeMap;
use tracing::warn;

async fn emergency_page(state: &AppState) -> String {
    tokio::fs::read_to_string(&state.config.assets.emergency_page)
        .await
        .unwrap_or_else(|_| "Please check back shortly.".to_string())
}

/// GET `/` — host-based dispatch between the Click Dispatcher and the App
/// Event Correlator.
pub async fn index(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<BTreeMap<String, String>>,
) -> Response {
    let host = host_header(&headers);

    if state.config.hosts.in_app_hosts.iter().any(|h| h == &host) {
        let force_install = host == state.config.hosts.flow_host;
        let Some(event) = build_app_event(&query, &headers, force_install) else {
            return response::json_error(400, "No event type provided.");
        };
        let outcome = state.correlator.handle(event).await;
        return finish(&state, outcome).await;
    }

    let clid = match state.store.mint_click_id() {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to mint click id");
            return response::emergency(emergency_page(&state).await);
        }
    };
    let event = build_web_event(&query, &headers, clid);
    let outcome = state.dispatcher.dispatch(event).await;
    finish(&state, outcome).await
}

async fn finish(state: &AppState, outcome: Outcome) -> Response {
    match outcome {
        Outcome::RenderLanding { landing_id, cookie } => render_landing(state, landing_id, cookie).await,
        other => response::simple_outcome(other, &emergency_page(state).await),
    }
}

async fn render_landing(state: &AppState, landing_id: i64, cookie: Option<String>) -> Response {
    let Some(landing) = state.store.get_landing(landing_id) else {
        return response::emergency(emergency_page(state).await);
    };
    let path = format!(
        "{}/{}/index.html",
        state.config.assets.templates_dir, landing.working_directory
    );
    let body = match tokio::fs::read_to_string(&path).await {
        Ok(body) => body,
        Err(e) => {
            warn!(error = %e, path, "landing page missing, falling back to emergency");
            return response::emergency(emergency_page(state).await);
        }
    };

    let mut response = Html(body).into_response();
    if let Some(cookie) = cookie {
        if let Ok(value) = header::HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly",
            landing_cookie::COOKIE_NAME,
            cookie
        )) {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

fn parse_cookies(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let Some(raw) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) else {
        return out;
    };
    for pair in raw.split(';') {
        if let Some((k, v)) = pair.trim().split_once('=') {
            out.insert(k.to_string(), v.to_string());
        }
    }
    out
}

/// GET `/<path>` — Landing Asset Server (C7). Paths without a `.` fall
/// through to the click/beacon dispatcher.
pub async fn landing_asset(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
    query: Query<BTreeMap<String, String>>,
) -> Response {
    if !path.contains('.') {
        return index(State(state), headers, query).await;
    }

    let cookies = parse_cookies(&headers);
    if let Some(cookie_value) = cookies.get(landing_cookie::COOKIE_NAME) {
        if let Some(landing_id) = landing_cookie::landing_id(cookie_value) {
            if let Some(landing) = state.store.get_landing(landing_id) {
                let full_path = format!(
                    "{}/{}/{}",
                    state.config.assets.templates_dir, landing.working_directory, path
                );
                return serve_file(&full_path)
                    .await
                    .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response());
            }
        }
    }

    let full_path = format!("{}/{}", state.config.assets.static_dir, path);
    serve_file(&full_path)
        .await
        .unwrap_or_else(|| StatusCode::NOT_FOUND.into_response())
}

async fn serve_file(path: &str) -> Option<Response> {
    let bytes = tokio::fs::read(path).await.ok()?;
    let is_html = path.ends_with(".html");
    let content_type = if is_html {
        "text/html; charset=utf-8"
    } else {
        "application/octet-stream"
    };
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if !is_html {
        builder = builder.header(header::CONTENT_DISPOSITION, "attachment");
    }
    Some(
        builder
            .body(axum::body::Body::from(bytes))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
    )
}

/// GET/POST `/emergency` — static fallback page, always 200.
pub async fn emergency(State(state): State<AppState>) -> Response {
    response::emergency(emergency_page(&state).await)
}

/// Escapes a value for safe interpolation into an HTML attribute.
fn escape_html_attr(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\'', "&#39;")
}

/// Escapes a value for safe interpolation as a JS string literal inside a
/// `<script>` block. `serde_json` gives us a properly quoted, escaped JS
/// string; `</script>`-breakout is blocked by further escaping angle
/// brackets, since JSON string escaping alone doesn't touch them.
fn js_string_literal(value: &str) -> String {
    let quoted = serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string());
    quoted.replace('<', "\\u003c").replace('>', "\\u003e")
}

/// GET/POST `/conversion` — renders a Google-tag conversion beacon page.
pub async fn conversion(Query(query): Query<BTreeMap<String, String>>) -> Response {
    let gtag_id = query.get("gtagId").cloned().unwrap_or_default();
    let conv_label = query.get("convLabel").cloned().unwrap_or_default();
    let conv_value = query.get("convValue").cloned().unwrap_or_default();
    let trans_id = query.get("transId").cloned().unwrap_or_default();

    let gtag_id_attr = escape_html_attr(&gtag_id);
    let gtag_id_js = js_string_literal(&gtag_id);
    let send_to_js = js_string_literal(&format!("{gtag_id}/{conv_label}"));
    let conv_value_js = js_string_literal(&conv_value);
    let trans_id_js = js_string_literal(&trans_id);

    let body = format!(
        r#"<!DOCTYPE html>
<html><head><meta charset="utf-8">
<script async src="https://www.googletagmanager.com/gtag/js?id={gtag_id_attr}"></script>
<script>
  window.dataLayer = window.dataLayer || [];
  function gtag(){{dataLayer.push(arguments);}}
  gtag('js', new Date());
  gtag('config', {gtag_id_js});
  gtag('event', 'conversion', {{
    'send_to': {send_to_js},
    'value': {conv_value_js},
    'currency': 'USD',
    'transaction_id': {trans_id_js}
  }});
</script>
</head><body></body></html>"#
    );
    Html(body).into_response()
}
