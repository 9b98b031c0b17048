//! Background-only outbound calls: click persistence, conversion
//! forwarding, stats, and the non-unique mark on the classifier stream.
//!
//! Grounded on `ClickWeb.save_click` and `ClickApp.send_conversion_to_fb`:
//! plain best-effort POSTs whose failures are logged and never surfaced
//! to the caller. These run only inside the background executor — never
//! awaited on the response path.

use gateway_core::config::SinksConfig;
use gateway_core::types::{CampaignClick, EventKind};
use serde_json::json;
use tracing::warn;

#[derive(Clone)]
pub struct Sinks {
    http: reqwest::Client,
    config: SinksConfig,
}

impl Sinks {
    pub fn new(config: SinksConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub async fn save_click(&self, click: CampaignClick) {
        let url = format!("{}/save_click", self.config.event_service_base_url);
        let body = json!({
            "act": "savedata",
            "key": click.click_id,
            "rma": click.rma,
            "fbclid": click.fbclid,
            "domain": click.domain,
            "gclid": click.gclid,
            "pay": click.pay,
            "ulb": click.ulb,
        });
        if let Err(e) = self.http.post(&url).json(&body).send().await {
            warn!(error = %e, click_id = %click.click_id, "save_click sink failed");
        }
    }

    pub async fn save_campaign_event(&self, click: CampaignClick, event: &'static str) {
        let url = format!("{}/campaign_event", self.config.stats_service_base_url);
        let body = json!({
            "click_id": click.click_id,
            "campaign_id": click.campaign_id,
            "app_id": click.app_id,
            "event": event,
            "geo": click.geo,
        });
        if let Err(e) = self.http.post(&url).json(&body).send().await {
            warn!(error = %e, click_id = %click.click_id, "save_campaign_event sink failed");
        }
    }

    pub async fn save_app_event(&self, click: CampaignClick, kind: EventKind) {
        let url = format!("{}/app_event", self.config.stats_service_base_url);
        let body = json!({
            "click_id": click.click_id,
            "app_id": click.app_id,
            "event": format!("{kind:?}").to_lowercase(),
            "geo": click.geo,
            "city": click.city,
        });
        if let Err(e) = self.http.post(&url).json(&body).send().await {
            warn!(error = %e, click_id = %click.click_id, "save_app_event sink failed");
        }
    }

    pub async fn send_conversion(&self, click: CampaignClick, kind: EventKind) {
        use gateway_core::types::ClickSource;
        use sha2::{Digest, Sha256};
        let basis = click.fbclid.as_deref().unwrap_or(&click.click_id);
        let mut hasher = Sha256::new();
        hasher.update(basis.as_bytes());
        let key = hex::encode(hasher.finalize());

        let url = format!("{}/send_conversion", self.config.event_service_base_url);
        let mut body = json!({
            "key": key,
            "event": format!("{kind:?}").to_lowercase(),
            "appclid": click.appclid,
            "click_source": format!("{:?}", click.click_source).to_lowercase(),
        });
        if click.click_source == ClickSource::Google {
            body["gclabel"] = json!(click.clabel);
            body["gtag"] = json!(click.gtag);
        }
        if let Err(e) = self.http.post(&url).json(&body).send().await {
            warn!(error = %e, click_id = %click.click_id, "send_conversion sink failed");
        }
    }

    pub async fn search_user_by_attribution(&self, ip: Option<String>, user_agent: Option<String>) -> Option<String> {
        let url = format!("{}/search_user", self.config.user_attribution_base_url);
        let body = json!({ "user_ip": ip, "user_agent": user_agent });
        match self.http.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<serde_json::Value>()
                .await
                .ok()?
                .get("user_data")?
                .get("panel_clid")?
                .as_str()
                .map(str::to_string),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "search_user_by_attribution sink failed");
                None
            }
        }
    }
}
