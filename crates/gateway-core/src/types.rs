//! Domain model for the click/event pipeline. Semantic types, not storage
//! types — `gateway-store` owns how these are kept and indexed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingSystem {
    Android,
    Ios,
}

impl OperatingSystem {
    /// Parses a classifier-supplied device string. Anything not
    /// recognized as iOS is treated as Android, matching the original
    /// system's implicit default.
    pub fn from_device_str(device: &str) -> Self {
        match device.to_lowercase().as_str() {
            "ios" | "iphone" | "ipad" => OperatingSystem::Ios,
            _ => OperatingSystem::Android,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Banned,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub identity: String,
    pub credential_hash: String,
    pub role: UserRole,
    pub status: UserStatus,
    /// Fixed-point balance, stored as integer cents to avoid float drift.
    pub balance_cents: i64,
    pub stable_hash: String,
    pub panel_key: String,
}

impl User {
    pub fn can_receive_traffic(&self) -> bool {
        self.status == UserStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppStatus {
    Active,
    Inactive,
    Suspended,
    Banned,
    Deleted,
}

/// Install destination. Counters are atomics because the selector reads
/// and the correlator increments them from concurrent requests.
#[derive(Debug, Serialize, Deserialize)]
pub struct App {
    pub id: i64,
    pub title: String,
    /// Contains the literal placeholder `PANELCLID`.
    pub url: String,
    pub os: OperatingSystem,
    pub tags: Vec<String>,
    pub status: AppStatus,
    pub classifier_stream_id: String,
    #[serde(skip, default)]
    pub views: AtomicU64,
    #[serde(skip, default)]
    pub installs: AtomicU64,
    #[serde(skip, default)]
    pub registrations: AtomicU64,
    #[serde(skip, default)]
    pub deposits: AtomicU64,
    pub price_per_install_cents: i64,
    pub price_per_registration_cents: i64,
    pub price_per_deposit_cents: i64,
    pub allowed_user_ids: Vec<i64>,
    pub stable_hash: String,
}

impl Clone for App {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            title: self.title.clone(),
            url: self.url.clone(),
            os: self.os,
            tags: self.tags.clone(),
            status: self.status,
            classifier_stream_id: self.classifier_stream_id.clone(),
            views: AtomicU64::new(self.views.load(Ordering::Relaxed)),
            installs: AtomicU64::new(self.installs.load(Ordering::Relaxed)),
            registrations: AtomicU64::new(self.registrations.load(Ordering::Relaxed)),
            deposits: AtomicU64::new(self.deposits.load(Ordering::Relaxed)),
            price_per_install_cents: self.price_per_install_cents,
            price_per_registration_cents: self.price_per_registration_cents,
            price_per_deposit_cents: self.price_per_deposit_cents,
            allowed_user_ids: self.allowed_user_ids.clone(),
            stable_hash: self.stable_hash.clone(),
        }
    }
}

impl App {
    pub fn is_active(&self) -> bool {
        self.status == AppStatus::Active
    }

    pub fn is_allowed_for(&self, user_id: i64) -> bool {
        self.allowed_user_ids.contains(&user_id)
    }

    pub fn count_view(&self) {
        self.views.fetch_add(1, Ordering::Relaxed);
    }

    pub fn views(&self) -> u64 {
        self.views.load(Ordering::Relaxed)
    }

    /// Substitute the `PANELCLID` placeholder with this click's id. Exact
    /// string replace, no other mutation of the URL permitted.
    pub fn redirect_url(&self, click_id: &str) -> String {
        self.url.replace("PANELCLID", click_id)
    }
}

/// One weighted member of a campaign's app rotation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppStat {
    pub app_id: i64,
    pub weight: u32,
    pub visits: u64,
    pub classifier_stream_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CampaignStatus {
    Active,
    Paused,
    Archived,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub title: String,
    pub owner_user_id: i64,
    pub subuser_id: Option<i64>,
    pub geo: Option<String>,
    pub offer_url: Option<String>,
    pub os: OperatingSystem,
    pub app_ids: Vec<i64>,
    pub apps_stats: Vec<AppStat>,
    pub app_tags: Vec<String>,
    pub landing_id: Option<i64>,
    pub custom_parameters: std::collections::BTreeMap<String, String>,
    pub status: CampaignStatus,
    pub archived: bool,
    pub stable_hash: String,
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        self.status == CampaignStatus::Active && !self.archived
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandingStatus {
    Active,
    Inactive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Landing {
    pub id: i64,
    pub working_directory: String,
    pub status: LandingStatus,
    pub geo: Option<String>,
    pub tags: Vec<String>,
}

impl Landing {
    pub fn is_active(&self) -> bool {
        self.status == LandingStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickSource {
    Facebook,
    Google,
    Tiktok,
    None,
}

impl ClickSource {
    pub fn from_ids(fbclid: &Option<String>, gclid: &Option<String>, ttclid: &Option<String>) -> Self {
        if fbclid.is_some() {
            ClickSource::Facebook
        } else if gclid.is_some() {
            ClickSource::Google
        } else if ttclid.is_some() {
            ClickSource::Tiktok
        } else {
            ClickSource::None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClickResult {
    App,
    Offer,
    Landing,
    Emergency,
}

/// The central event record. Created eagerly, before the redirect decision
/// is final, so a concurrent app beacon can already find it by `click_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignClick {
    /// 10-char hex click id, unique across all history.
    pub click_id: String,
    pub domain: String,
    pub fbclid: Option<String>,
    pub gclid: Option<String>,
    pub ttclid: Option<String>,
    pub click_source: ClickSource,
    pub rma: String,
    pub ulb: u32,
    pub pay: i32,
    pub kclid: Option<String>,
    /// Google-conversion label/value, carried through from the originating
    /// click so `send_conversion` can attach them when `click_source` is
    /// `Google`.
    pub clabel: Option<String>,
    pub gtag: Option<String>,
    pub request_parameters: std::collections::BTreeMap<String, String>,
    pub campaign_id: i64,
    pub app_id: Option<i64>,
    pub app_installed: bool,
    pub app_registered: bool,
    pub app_deposited: bool,
    pub appclid: Option<String>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub blocked: bool,
    pub geo: Option<String>,
    pub city: Option<String>,
    pub device: Option<String>,
    pub timezone: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub offer_url: Option<String>,
    pub result: Option<ClickResult>,
    pub deposit_amount_cents: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSign {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub user_id: i64,
    pub sign: TransactionSign,
    pub amount_cents: i64,
    pub reason: String,
    pub geo: Option<String>,
    pub app_id: Option<i64>,
    pub os: Option<OperatingSystem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Install,
    Reg,
    Dep,
    /// Rewritten forms produced by the §4.5 step-4 dedup gate; these never
    /// charge and only redirect to the offer URL.
    Entry,
    Rereg,
    Redep,
}

impl EventKind {
    pub fn is_chargeable(&self) -> bool {
        matches!(self, EventKind::Install | EventKind::Reg | EventKind::Dep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_app(url: &str) -> App {
        App {
            id: 1,
            title: "Sample".to_string(),
            url: url.to_string(),
            os: OperatingSystem::Android,
            tags: vec![],
            status: AppStatus::Active,
            classifier_stream_id: "stream-1".to_string(),
            views: AtomicU64::new(0),
            installs: AtomicU64::new(0),
            registrations: AtomicU64::new(0),
            deposits: AtomicU64::new(0),
            price_per_install_cents: 6,
            price_per_registration_cents: 0,
            price_per_deposit_cents: 0,
            allowed_user_ids: vec![7],
            stable_hash: "hash".to_string(),
        }
    }

    #[test]
    fn panelclid_is_substituted_exactly_once_in_place() {
        let app = sample_app("https://a.example/?id=PANELCLID&src=x");
        let redirected = app.redirect_url("abc1234567");
        assert_eq!(redirected, "https://a.example/?id=abc1234567&src=x");
    }

    #[test]
    fn redirect_url_leaves_non_placeholder_text_untouched() {
        let app = sample_app("https://a.example/landing");
        assert_eq!(app.redirect_url("abc1234567"), "https://a.example/landing");
    }

    #[test]
    fn allowed_user_ids_gate_selection() {
        let app = sample_app("https://a.example/?id=PANELCLID");
        assert!(app.is_allowed_for(7));
        assert!(!app.is_allowed_for(8));
    }
}
