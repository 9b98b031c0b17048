//! In-memory store backed by DashMap.
//!
//! Production: replace with a real ACID database (sqlx/Postgres); this
//! gives the same API surface for development and testing, following the
//! pattern of the teacher's billing/management stores.

use chrono::Utc;
use dashmap::DashMap;
use gateway_core::types::{App, Campaign, CampaignClick, Landing, Transaction, User};
use gateway_core::{GatewayError, GatewayResult};
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::warn;

pub struct GatewayStore {
    users: DashMap<i64, User>,
    apps: DashMap<i64, App>,
    campaigns: DashMap<i64, Campaign>,
    landings: DashMap<i64, Landing>,
    /// Keyed by the click's own id — the hot lookup path for both the
    /// dispatcher (on create) and the correlator (on beacon).
    campaign_clicks: DashMap<String, CampaignClick>,
    transactions: DashMap<i64, Transaction>,
    next_transaction_id: AtomicI64,
}

impl GatewayStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            apps: DashMap::new(),
            campaigns: DashMap::new(),
            landings: DashMap::new(),
            campaign_clicks: DashMap::new(),
            transactions: DashMap::new(),
            next_transaction_id: AtomicI64::new(1),
        }
    }

    // ─── Users ───────────────────────────────────────────────────────────

    pub fn get_user(&self, id: i64) -> Option<User> {
        self.users.get(&id).map(|r| r.value().clone())
    }

    pub fn get_user_by_panel_key(&self, key: &str) -> Option<User> {
        self.users
            .iter()
            .find(|r| r.value().panel_key == key)
            .map(|r| r.value().clone())
    }

    pub fn put_user(&self, user: User) {
        self.users.insert(user.id, user);
    }

    fn debit_user(&self, user_id: i64, amount_cents: i64) -> GatewayResult<()> {
        let mut entry = self
            .users
            .get_mut(&user_id)
            .ok_or_else(|| GatewayError::NotFound(format!("user {user_id}")))?;
        entry.balance_cents -= amount_cents;
        Ok(())
    }

    // ─── Apps ────────────────────────────────────────────────────────────

    pub fn get_app(&self, id: i64) -> Option<App> {
        self.apps.get(&id).map(|r| r.value().clone())
    }

    pub fn put_app(&self, app: App) {
        self.apps.insert(app.id, app);
    }

    pub fn apps_by_ids(&self, ids: &[i64]) -> Vec<App> {
        ids.iter().filter_map(|id| self.get_app(*id)).collect()
    }

    pub fn apps_by_tag(&self, tag: &str) -> Vec<App> {
        self.apps
            .iter()
            .filter(|r| r.value().tags.iter().any(|t| t == tag))
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn apps_by_os(&self, os: gateway_core::types::OperatingSystem) -> Vec<App> {
        self.apps
            .iter()
            .filter(|r| r.value().os == os)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn count_app_install(&self, app_id: i64) {
        if let Some(entry) = self.apps.get(&app_id) {
            entry
                .value()
                .installs
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count_app_registration(&self, app_id: i64) {
        if let Some(entry) = self.apps.get(&app_id) {
            entry
                .value()
                .registrations
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count_app_deposit(&self, app_id: i64) {
        if let Some(entry) = self.apps.get(&app_id) {
            entry.value().deposits.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count_app_view(&self, app_id: i64) {
        if let Some(entry) = self.apps.get(&app_id) {
            entry.value().count_view();
        }
    }

    // ─── Campaigns ───────────────────────────────────────────────────────

    pub fn get_campaign(&self, id: i64) -> Option<Campaign> {
        self.campaigns.get(&id).map(|r| r.value().clone())
    }

    pub fn get_campaign_by_hash(&self, hash: &str) -> Option<Campaign> {
        self.campaigns
            .iter()
            .find(|r| r.value().stable_hash == hash)
            .map(|r| r.value().clone())
    }

    pub fn put_campaign(&self, campaign: Campaign) {
        self.campaigns.insert(campaign.id, campaign);
    }

    /// Increment `visits` on the chosen app's stat row, initializing the
    /// whole `apps_stats` list at `100 / len(apps)` per app the first time
    /// any selection happens, exactly as the original balancer did.
    pub fn record_app_visit(&self, campaign_id: i64, app_id: i64) {
        if let Some(mut entry) = self.campaigns.get_mut(&campaign_id) {
            let campaign = entry.value_mut();
            if campaign.apps_stats.is_empty() && !campaign.app_ids.is_empty() {
                let even_weight = (100 / campaign.app_ids.len() as u32).max(1);
                campaign.apps_stats = campaign
                    .app_ids
                    .iter()
                    .map(|id| gateway_core::types::AppStat {
                        app_id: *id,
                        weight: even_weight,
                        visits: 0,
                        classifier_stream_id: String::new(),
                    })
                    .collect();
            }
            if let Some(stat) = campaign
                .apps_stats
                .iter_mut()
                .find(|s| s.app_id == app_id)
            {
                stat.visits += 1;
            }
        }
    }

    // ─── Landings ────────────────────────────────────────────────────────

    pub fn get_landing(&self, id: i64) -> Option<Landing> {
        self.landings.get(&id).map(|r| r.value().clone())
    }

    pub fn put_landing(&self, landing: Landing) {
        self.landings.insert(landing.id, landing);
    }

    // ─── Campaign clicks ─────────────────────────────────────────────────

    pub fn get_click(&self, click_id: &str) -> Option<CampaignClick> {
        self.campaign_clicks.get(click_id).map(|r| r.value().clone())
    }

    /// Mint a click id unique across all history: 5 random bytes, hex
    /// encoded (10 chars), retried up to 100 times against the live set —
    /// the same bound the original `EventWeb.clid` property used.
    pub fn mint_click_id(&self) -> GatewayResult<String> {
        use rand::RngCore;
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let mut bytes = [0u8; 5];
            rng.fill_bytes(&mut bytes);
            let candidate = hex::encode(bytes);
            if !self.campaign_clicks.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(GatewayError::Unexpected(anyhow::anyhow!(
            "exhausted click id generation attempts"
        )))
    }

    fn insert_click(&self, click: CampaignClick) {
        self.campaign_clicks.insert(click.click_id.clone(), click);
    }

    fn update_click<F: FnOnce(&mut CampaignClick)>(&self, click_id: &str, f: F) -> bool {
        match self.campaign_clicks.get_mut(click_id) {
            Some(mut entry) => {
                f(entry.value_mut());
                true
            }
            None => false,
        }
    }

    // ─── Transactions ────────────────────────────────────────────────────

    fn record_transaction(&self, mut txn: Transaction) -> Transaction {
        txn.id = self.next_transaction_id.fetch_add(1, Ordering::Relaxed);
        self.transactions.insert(txn.id, txn.clone());
        txn
    }

    /// Open a fresh per-request session (§4.8 / §9). All staged writes
    /// commit together on `Session::commit`; dropping an uncommitted
    /// session is a silent rollback.
    pub fn open_session(&self) -> Session<'_> {
        Session::new(self)
    }
}

impl Default for GatewayStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged write, applied in order by `Session::commit`.
enum SessionOp {
    InsertClick(CampaignClick),
    SetAppId(String, i64),
    SetBlocked(String, bool),
    SetResult(String, gateway_core::types::ClickResult, Option<String>),
    SetAppEventFields {
        click_id: String,
        appclid: Option<String>,
        pay: Option<i32>,
    },
    TransitionFlag {
        click_id: String,
        kind: gateway_core::types::EventKind,
        deposit_amount_cents: Option<i64>,
    },
    Debit {
        user_id: i64,
        amount_cents: i64,
        reason: String,
        geo: Option<String>,
        app_id: Option<i64>,
        os: Option<gateway_core::types::OperatingSystem>,
    },
    RecordAppVisit {
        campaign_id: i64,
        app_id: i64,
    },
}

/// Explicit transaction handle passed through the call stack for the
/// duration of one request (spec §9: "re-implement as an explicit
/// transaction handle... commit happens on normal exit, rollback on
/// exception"). Writes staged here are invisible to other requests until
/// `commit()` runs.
pub struct Session<'a> {
    store: &'a GatewayStore,
    ops: Vec<SessionOp>,
    committed: bool,
}

impl<'a> Session<'a> {
    fn new(store: &'a GatewayStore) -> Self {
        Self {
            store,
            ops: Vec::new(),
            committed: false,
        }
    }

    pub fn stage_insert_click(&mut self, click: CampaignClick) {
        self.ops.push(SessionOp::InsertClick(click));
    }

    pub fn stage_set_app_id(&mut self, click_id: impl Into<String>, app_id: i64) {
        self.ops.push(SessionOp::SetAppId(click_id.into(), app_id));
    }

    pub fn stage_set_blocked(&mut self, click_id: impl Into<String>, blocked: bool) {
        self.ops.push(SessionOp::SetBlocked(click_id.into(), blocked));
    }

    pub fn stage_set_result(
        &mut self,
        click_id: impl Into<String>,
        result: gateway_core::types::ClickResult,
        offer_url: Option<String>,
    ) {
        self.ops
            .push(SessionOp::SetResult(click_id.into(), result, offer_url));
    }

    pub fn stage_set_app_event_fields(
        &mut self,
        click_id: impl Into<String>,
        appclid: Option<String>,
        pay: Option<i32>,
    ) {
        self.ops.push(SessionOp::SetAppEventFields {
            click_id: click_id.into(),
            appclid,
            pay,
        });
    }

    /// Flips the per-kind flag and inserts the matching Transaction in the
    /// same staged unit, satisfying invariant 5 (debit and flag flip are
    /// atomic relative to one another).
    pub fn stage_transition_and_debit(
        &mut self,
        click_id: impl Into<String>,
        kind: gateway_core::types::EventKind,
        deposit_amount_cents: Option<i64>,
        user_id: i64,
        amount_cents: i64,
        reason: String,
        geo: Option<String>,
        app_id: Option<i64>,
        os: Option<gateway_core::types::OperatingSystem>,
    ) {
        let click_id = click_id.into();
        self.ops.push(SessionOp::TransitionFlag {
            click_id,
            kind,
            deposit_amount_cents,
        });
        self.ops.push(SessionOp::Debit {
            user_id,
            amount_cents,
            reason,
            geo,
            app_id,
            os,
        });
    }

    pub fn stage_record_app_visit(&mut self, campaign_id: i64, app_id: i64) {
        self.ops.push(SessionOp::RecordAppVisit { campaign_id, app_id });
    }

    /// Apply every staged write. Writes become visible to other requests
    /// only after this returns.
    pub fn commit(mut self) -> GatewayResult<()> {
        for op in self.ops.drain(..) {
            match op {
                SessionOp::InsertClick(click) => self.store.insert_click(click),
                SessionOp::SetAppId(click_id, app_id) => {
                    self.store.update_click(&click_id, |c| c.app_id = Some(app_id));
                }
                SessionOp::SetBlocked(click_id, blocked) => {
                    self.store.update_click(&click_id, |c| c.blocked = blocked);
                }
                SessionOp::SetResult(click_id, result, offer_url) => {
                    self.store.update_click(&click_id, |c| {
                        c.result = Some(result);
                        if offer_url.is_some() {
                            c.offer_url = offer_url;
                        }
                    });
                }
                SessionOp::SetAppEventFields {
                    click_id,
                    appclid,
                    pay,
                } => {
                    self.store.update_click(&click_id, |c| {
                        if appclid.is_some() {
                            c.appclid = appclid;
                        }
                        if let Some(pay) = pay {
                            c.pay = pay;
                        }
                    });
                }
                SessionOp::TransitionFlag {
                    click_id,
                    kind,
                    deposit_amount_cents,
                } => {
                    self.store.update_click(&click_id, |c| match kind {
                        gateway_core::types::EventKind::Install => c.app_installed = true,
                        gateway_core::types::EventKind::Reg => c.app_registered = true,
                        gateway_core::types::EventKind::Dep => {
                            c.app_deposited = true;
                            c.deposit_amount_cents = deposit_amount_cents;
                        }
                        _ => {}
                    });
                }
                SessionOp::Debit {
                    user_id,
                    amount_cents,
                    reason,
                    geo,
                    app_id,
                    os,
                } => {
                    self.store.debit_user(user_id, amount_cents)?;
                    self.store.record_transaction(Transaction {
                        id: 0,
                        user_id,
                        sign: gateway_core::types::TransactionSign::Debit,
                        amount_cents,
                        reason,
                        geo,
                        app_id,
                        os,
                        created_at: Utc::now(),
                    });
                }
                SessionOp::RecordAppVisit { campaign_id, app_id } => {
                    self.store.record_app_visit(campaign_id, app_id);
                }
            }
        }
        self.committed = true;
        Ok(())
    }
}

impl<'a> Drop for Session<'a> {
    fn drop(&mut self) {
        if !self.committed && !self.ops.is_empty() {
            warn!(pending_ops = self.ops.len(), "session dropped without commit, rolling back");
        }
    }
}
