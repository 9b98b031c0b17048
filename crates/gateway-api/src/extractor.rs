//! Event Extractor (C1): turns a raw HTTP request into a typed `WebEvent`
//! or `AppEvent`.
//!
//! Ported from `EventWeb`/`EventApp`: client IP prefers `CF-Connecting-IP`
//! then `X-Forwarded-For`; unknown query parameters are preserved verbatim
//! for the offer-URL merge instead of being dropped.

use axum::http::HeaderMap;
use gateway_core::events::{AppEvent, RawEventKind, WebEvent};
use gateway_core::types::ClickSource;
use rand::Rng;
use std::collections::BTreeMap;

const WEB_KNOWN_KEYS: &[&str] = &[
    "uchsik", "psa", "fbclid", "gclid", "ttclid", "rma", "pay", "clabel", "gtag",
];
const APP_KNOWN_KEYS: &[&str] = &["clid", "appclid", "pay", "event", "key", "amount"];

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Prefers `CF-Connecting-IP`, then the first hop of `X-Forwarded-For`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    if let Some(ip) = header_str(headers, "cf-connecting-ip") {
        return Some(ip.to_string());
    }
    header_str(headers, "x-forwarded-for").map(|fwd| fwd.split(',').next().unwrap_or(fwd).trim().to_string())
}

pub fn host_header(headers: &HeaderMap) -> String {
    header_str(headers, "host").unwrap_or("unknown").to_string()
}

pub fn build_web_event(query: &BTreeMap<String, String>, headers: &HeaderMap, clid: String) -> WebEvent {
    let fbclid = query.get("fbclid").cloned();
    let gclid = query.get("gclid").cloned();
    let ttclid = query.get("ttclid").cloned();
    let click_source = ClickSource::from_ids(&fbclid, &gclid, &ttclid);

    let pay = query
        .get("pay")
        .and_then(|v| v.parse::<i32>().ok())
        .unwrap_or_else(|| rand::thread_rng().gen_range(120..=210));
    let ulb = rand::thread_rng().gen_range(10_000_000..=99_999_999);

    let request_parameters = query
        .iter()
        .filter(|(k, _)| !WEB_KNOWN_KEYS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    WebEvent {
        uchsik: query.get("uchsik").cloned(),
        psa: query.get("psa").cloned(),
        fbclid,
        gclid,
        ttclid,
        click_source,
        rma: query.get("rma").cloned().unwrap_or_else(|| "Unknown".to_string()),
        pay,
        ulb,
        clabel: query.get("clabel").cloned(),
        gtag: query.get("gtag").cloned(),
        user_agent: header_str(headers, "user-agent").map(str::to_string),
        ip: client_ip(headers),
        host: host_header(headers),
        timezone: header_str(headers, "cf-timezone").map(str::to_string),
        utc_offset: header_str(headers, "cf-utc-offset").and_then(|v| v.parse().ok()),
        lat: header_str(headers, "cf-iplatitude").and_then(|v| v.parse().ok()),
        long: header_str(headers, "cf-iplongitude").and_then(|v| v.parse().ok()),
        referer: header_str(headers, "referer").map(str::to_string),
        clid,
        request_parameters,
    }
}

/// `event` is forced to `install` when the request arrived on the
/// install-only flow host, regardless of the query string.
pub fn build_app_event(
    query: &BTreeMap<String, String>,
    headers: &HeaderMap,
    force_install: bool,
) -> Option<AppEvent> {
    let event = if force_install {
        RawEventKind::Install
    } else {
        match query.get("event").map(String::as_str) {
            Some("install") => RawEventKind::Install,
            Some("reg") => RawEventKind::Reg,
            Some("dep") => RawEventKind::Dep,
            _ => return None,
        }
    };

    let _ = APP_KNOWN_KEYS;
    Some(AppEvent {
        clid: query.get("clid").cloned(),
        appclid: query.get("appclid").cloned(),
        pay: query.get("pay").cloned(),
        event,
        key: query.get("key").cloned(),
        amount_cents: query
            .get("amount")
            .and_then(|v| v.parse::<f64>().ok())
            .map(|dollars| (dollars * 100.0).round() as i64),
        user_agent: header_str(headers, "user-agent").map(str::to_string),
        ip: client_ip(headers),
        city: header_str(headers, "cf-ipcity").map(str::to_string),
        country: header_str(headers, "cf-ipcountry").map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (k, v) in pairs {
            headers.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        headers
    }

    #[test]
    fn prefers_cf_connecting_ip_over_forwarded_for() {
        let headers = headers_with(&[("cf-connecting-ip", "1.2.3.4"), ("x-forwarded-for", "9.9.9.9, 1.1.1.1")]);
        assert_eq!(client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn falls_back_to_first_hop_of_forwarded_for() {
        let headers = headers_with(&[("x-forwarded-for", "9.9.9.9, 1.1.1.1")]);
        assert_eq!(client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn unknown_query_keys_pass_through_to_request_parameters() {
        let mut query = BTreeMap::new();
        query.insert("uchsik".to_string(), "H".to_string());
        query.insert("sub1".to_string(), "abc".to_string());
        let event = build_web_event(&query, &HeaderMap::new(), "c1".to_string());
        assert_eq!(event.request_parameters.get("sub1"), Some(&"abc".to_string()));
        assert!(!event.request_parameters.contains_key("uchsik"));
    }

    #[test]
    fn force_install_overrides_event_query_param() {
        let mut query = BTreeMap::new();
        query.insert("event".to_string(), "dep".to_string());
        query.insert("clid".to_string(), "c1".to_string());
        let event = build_app_event(&query, &HeaderMap::new(), true).unwrap();
        assert_eq!(event.event, RawEventKind::Install);
    }

    #[test]
    fn missing_event_on_non_install_host_yields_none() {
        let query = BTreeMap::new();
        assert!(build_app_event(&query, &HeaderMap::new(), false).is_none());
    }
}
