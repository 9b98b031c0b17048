//! Client for the external bot/geo/device classification service (C2).
//!
//! Grounded on the original `KeitaroApi`: a GET carrying token, ip, UA,
//! language and the merged request parameters, whose JSON body's `result`
//! field is either the classifier's verdict payload or the string
//! `"error"`. Transport here is `reqwest`, following the pattern in the
//! AdView Manager's `Manager` (typed `thiserror` error wrapping
//! `reqwest::Error`, a per-call `reqwest::Client`).

use gateway_core::config::ClassifierConfig;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier returned malformed response")]
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Block,
    /// Network failure or non-200 — drives the dispatcher to emergency.
    Error,
}

#[derive(Debug, Clone)]
pub struct ClickCheck {
    pub verdict: Verdict,
    pub geo: Option<String>,
    pub city: Option<String>,
    pub device: Option<String>,
    pub kclid: Option<String>,
}

#[derive(Deserialize)]
struct ClickCheckResponse {
    result: serde_json::Value,
}

#[derive(Deserialize)]
struct UniquenessResponse {
    info: UniquenessInfo,
}

#[derive(Deserialize)]
struct UniquenessInfo {
    uniqueness: UniquenessStream,
}

#[derive(Deserialize)]
struct UniquenessStream {
    stream: bool,
}

fn parse_click_check(result: &serde_json::Value) -> ClickCheck {
    if result.as_str() == Some("error") {
        return ClickCheck {
            verdict: Verdict::Error,
            geo: None,
            city: None,
            device: None,
            kclid: None,
        };
    }

    let verdict = match result.get("verdict").and_then(|v| v.as_str()) {
        Some("okay") => Verdict::Pass,
        Some("block") => Verdict::Block,
        _ => Verdict::Error,
    };
    ClickCheck {
        verdict,
        geo: result.get("geo").and_then(|v| v.as_str()).map(str::to_string),
        city: result.get("city").and_then(|v| v.as_str()).map(str::to_string),
        device: result
            .get("device")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        kclid: result
            .get("kclid")
            .and_then(|v| v.as_str())
            .map(str::to_string),
    }
}

pub struct ClassifierClient {
    http: reqwest::Client,
    config: ClassifierConfig,
}

impl ClassifierClient {
    pub fn new(config: ClassifierConfig) -> Result<Self, ClassifierError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { http, config })
    }

    /// Submit request signals to the classifier. Capped at the configured
    /// timeout (default 200ms) with no retry — a slow retry costs more
    /// tail latency than it recovers.
    pub async fn check_click(
        &self,
        ip: Option<&str>,
        user_agent: Option<&str>,
        language: Option<&str>,
        extra: &std::collections::BTreeMap<String, String>,
    ) -> ClickCheck {
        let mut query: Vec<(String, String)> = vec![
            ("token".to_string(), self.config.api_token.clone()),
            ("log".to_string(), "1".to_string()),
            ("info".to_string(), "1".to_string()),
        ];
        if let Some(ip) = ip {
            query.push(("ip".to_string(), ip.to_string()));
        }
        if let Some(ua) = user_agent {
            query.push(("user_agent".to_string(), ua.to_string()));
        }
        if let Some(lang) = language {
            query.push(("language".to_string(), lang.to_string()));
        }
        for (k, v) in extra {
            query.push((k.clone(), v.clone()));
        }

        match self.do_check_click(&query).await {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, "classifier check_click failed, treating as error verdict");
                ClickCheck {
                    verdict: Verdict::Error,
                    geo: None,
                    city: None,
                    device: None,
                    kclid: None,
                }
            }
        }
    }

    async fn do_check_click(
        &self,
        query: &[(String, String)],
    ) -> Result<ClickCheck, ClassifierError> {
        let response = self
            .http
            .get(&self.config.base_url)
            .query(query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(ClickCheck {
                verdict: Verdict::Error,
                geo: None,
                city: None,
                device: None,
                kclid: None,
            });
        }

        let body: ClickCheckResponse = response.json().await?;
        Ok(parse_click_check(&body.result))
    }

    /// "Has this fingerprint hit this stream before?" — reused by the App
    /// Selector for per-stream uniqueness gating.
    pub async fn check_unique_app_user(
        &self,
        stream_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> bool {
        match self.do_check_unique(stream_id, ip, user_agent).await {
            Ok(unique) => unique,
            Err(e) => {
                warn!(error = %e, stream_id, "uniqueness check failed, treating as not unique");
                false
            }
        }
    }

    async fn do_check_unique(
        &self,
        stream_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool, ClassifierError> {
        let mut query = vec![
            ("token", self.config.api_token.clone()),
            ("stream_id", stream_id.to_string()),
            ("log", "1".to_string()),
            ("info", "1".to_string()),
        ];
        if let Some(ip) = ip {
            query.push(("ip", ip.to_string()));
        }
        if let Some(ua) = user_agent {
            query.push(("user_agent", ua.to_string()));
        }

        let response = self
            .http
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(false);
        }

        let body: UniquenessResponse = response.json().await.map_err(|_| ClassifierError::Malformed)?;
        Ok(body.info.uniqueness.stream)
    }

    /// Marks a stream's fingerprint as no longer unique, mirroring the
    /// original's `set_user_ununique`. Best-effort: failures are logged and
    /// never surfaced, since this only ever runs from the background
    /// executor after a chargeable install.
    pub async fn mark_non_unique(&self, stream_id: &str, ip: Option<&str>, user_agent: Option<&str>) {
        if let Err(e) = self.do_mark_non_unique(stream_id, ip, user_agent).await {
            warn!(error = %e, stream_id, "mark_non_unique failed");
        }
    }

    async fn do_mark_non_unique(
        &self,
        stream_id: &str,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<(), ClassifierError> {
        let mut query = vec![
            ("token", self.config.api_token.clone()),
            ("stream_id", stream_id.to_string()),
            ("set_ununique", "1".to_string()),
        ];
        if let Some(ip) = ip {
            query.push(("ip", ip.to_string()));
        }
        if let Some(ua) = user_agent {
            query.push(("user_agent", ua.to_string()));
        }

        self.http
            .get(&self.config.base_url)
            .query(&query)
            .send()
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_string_result_maps_to_error_verdict() {
        let value = serde_json::json!("error");
        let check = parse_click_check(&value);
        assert_eq!(check.verdict, Verdict::Error);
    }

    #[test]
    fn okay_verdict_carries_geo_and_device() {
        let value = serde_json::json!({
            "verdict": "okay",
            "geo": "US",
            "city": "Austin",
            "device": "iphone",
            "kclid": "k-9"
        });
        let check = parse_click_check(&value);
        assert_eq!(check.verdict, Verdict::Pass);
        assert_eq!(check.geo.as_deref(), Some("US"));
        assert_eq!(check.device.as_deref(), Some("iphone"));
        assert_eq!(check.kclid.as_deref(), Some("k-9"));
    }

    #[test]
    fn block_verdict_is_recognized() {
        let value = serde_json::json!({"verdict": "block"});
        assert_eq!(parse_click_check(&value).verdict, Verdict::Block);
    }

    #[test]
    fn unknown_verdict_string_falls_back_to_error() {
        let value = serde_json::json!({"verdict": "mystery"});
        assert_eq!(parse_click_check(&value).verdict, Verdict::Error);
    }
}
