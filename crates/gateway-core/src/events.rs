//! Request-shaped types produced by the Event Extractor (C1).

use crate::types::ClickSource;
use serde::{Deserialize, Serialize};

/// A fresh web click arriving at an owned landing domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebEvent {
    pub uchsik: Option<String>,
    pub psa: Option<String>,
    pub fbclid: Option<String>,
    pub gclid: Option<String>,
    pub ttclid: Option<String>,
    pub click_source: ClickSource,
    pub rma: String,
    pub pay: i32,
    pub ulb: u32,
    pub clabel: Option<String>,
    pub gtag: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub host: String,
    pub timezone: Option<String>,
    pub utc_offset: Option<i32>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub referer: Option<String>,
    pub clid: String,
    /// Every other query parameter, preserved for the offer URL merge.
    pub request_parameters: std::collections::BTreeMap<String, String>,
}

/// `psa` resolved into its two possible meanings.
#[derive(Debug, Clone)]
pub enum Psa {
    AppId(i64),
    Tag(String),
}

impl WebEvent {
    /// Numeric `psa` selects an App id directly; non-numeric selects a tag.
    pub fn psa_hint(&self) -> Option<Psa> {
        let raw = self.psa.as_ref()?;
        match raw.parse::<i64>() {
            Ok(id) => Some(Psa::AppId(id)),
            Err(_) => Some(Psa::Tag(raw.clone())),
        }
    }

    /// SHA-256 over the dominant source id, falling back to `clid`, used as
    /// a per-source idempotency key for downstream background tasks.
    pub fn idempotency_key(&self) -> String {
        use sha2::{Digest, Sha256};
        let basis = self
            .fbclid
            .as_deref()
            .or(self.gclid.as_deref())
            .or(self.ttclid.as_deref())
            .unwrap_or(&self.clid);
        let mut hasher = Sha256::new();
        hasher.update(basis.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawEventKind {
    Install,
    Reg,
    Dep,
}

/// A post-install beacon from an instrumented app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppEvent {
    pub clid: Option<String>,
    pub appclid: Option<String>,
    pub pay: Option<String>,
    pub event: RawEventKind,
    pub key: Option<String>,
    pub amount_cents: Option<i64>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
}
