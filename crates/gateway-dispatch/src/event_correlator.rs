//! App Event Correlator (C5): top-level handler for post-install beacons.
//!
//! Ported from `ClickApp.handle_app_click`. Dedup (step 4) rewrites a
//! repeat beacon to its non-chargeable form instead of raising, and the
//! per-kind charge always lands in the same staged commit as the flag
//! flip (`Session::stage_transition_and_debit`) to honor the "exactly
//! one charge per (click, kind)" invariant.

use crate::offer_url::offer_url_or_error;
use crate::sinks::Sinks;
use gateway_classifier::ClassifierClient;
use gateway_core::events::{AppEvent, RawEventKind};
use gateway_core::types::EventKind;
use gateway_core::{GatewayConfig, Outcome};
use gateway_executor::BackgroundExecutor;
use gateway_store::GatewayStore;
use std::sync::Arc;
use tracing::warn;

pub struct EventCorrelator {
    store: Arc<GatewayStore>,
    classifier: Arc<ClassifierClient>,
    executor: Arc<BackgroundExecutor>,
    sinks: Arc<Sinks>,
    config: Arc<GatewayConfig>,
}

impl EventCorrelator {
    pub fn new(
        store: Arc<GatewayStore>,
        classifier: Arc<ClassifierClient>,
        executor: Arc<BackgroundExecutor>,
        sinks: Arc<Sinks>,
        config: Arc<GatewayConfig>,
    ) -> Self {
        Self {
            store,
            classifier,
            executor,
            sinks,
            config,
        }
    }

    #[tracing::instrument(
        name = "app_event",
        skip(self, event),
        fields(click_id = tracing::field::Empty, campaign_id = tracing::field::Empty, event = ?event.event)
    )]
    pub async fn handle(&self, mut event: AppEvent) -> Outcome {
        if event.clid.is_none() {
            let recovered = self
                .sinks
                .search_user_by_attribution(event.ip.clone(), event.user_agent.clone())
                .await;
            match recovered {
                Some(clid) => event.clid = Some(clid),
                None => return Outcome::json_error(404, "Click not found."),
            }
        }
        let Some(clid) = event.clid.clone() else {
            return Outcome::json_error(404, "Click not found.");
        };
        tracing::Span::current().record("click_id", clid.as_str());

        let Some(click) = self.store.get_click(&clid) else {
            return Outcome::json_error(404, "Click not found.");
        };
        let Some(campaign) = self.store.get_campaign(click.campaign_id) else {
            return Outcome::json_error(404, "Campaign not found.");
        };
        tracing::Span::current().record("campaign_id", campaign.id);

        let kind = match (event.event, click.app_installed, click.app_registered, click.app_deposited) {
            (RawEventKind::Install, true, _, _) => EventKind::Entry,
            (RawEventKind::Install, false, _, _) => EventKind::Install,
            (RawEventKind::Reg, _, true, _) => EventKind::Rereg,
            (RawEventKind::Reg, _, false, _) => EventKind::Reg,
            (RawEventKind::Dep, _, _, true) => EventKind::Redep,
            (RawEventKind::Dep, _, _, false) => EventKind::Dep,
        };

        // Key validation keys off the *raw* beacon kind, not the
        // dedup-rewritten one: a duplicate install beacon (rewritten to
        // `entry`) still carries no key and must not be rejected for it.
        if !matches!(event.event, RawEventKind::Install) {
            let Some(key) = event.key.as_deref() else {
                return Outcome::json_error(400, "No key provided.");
            };
            let Some(user) = self.store.get_user_by_panel_key(key) else {
                return Outcome::json_error(404, "Key not found.");
            };
            if user.id != campaign.owner_user_id {
                return Outcome::json_error(404, "Key not valid.");
            }
        }

        let appclid = event.appclid.clone().filter(|_| click.appclid.is_none());
        let pay = event.pay.as_deref().and_then(|p| p.parse::<i32>().ok());
        if appclid.is_some() || pay.is_some() {
            let mut session = self.store.open_session();
            session.stage_set_app_event_fields(clid.clone(), appclid, pay);
            if let Err(e) = session.commit() {
                warn!(error = %e, "failed to persist app event fields");
            }
        }

        self.enqueue_send_conversion(clid.clone(), kind);

        if kind.is_chargeable() {
            if let Err(outcome) = self.charge(&clid, &campaign, &event, kind).await {
                return outcome;
            }
        }

        let click = self.store.get_click(&clid).unwrap_or(click);
        match offer_url_or_error(
            campaign.offer_url.as_deref(),
            &click.request_parameters,
            &campaign.custom_parameters,
            &clid,
            click.kclid.as_deref(),
        ) {
            Ok(url) => Outcome::redirect(url),
            Err(_) => Outcome::Emergency,
        }
    }

    async fn charge(
        &self,
        clid: &str,
        campaign: &gateway_core::types::Campaign,
        event: &AppEvent,
        kind: EventKind,
    ) -> Result<(), Outcome> {
        let Some(app_id) = self.store.get_click(clid).and_then(|c| c.app_id) else {
            return Ok(());
        };
        let Some(app) = self.store.get_app(app_id) else {
            return Ok(());
        };
        let Some(user) = self.store.get_user(campaign.owner_user_id) else {
            return Err(Outcome::json_error(404, "User not found."));
        };

        let (amount_cents, deposit_amount_cents) = match kind {
            EventKind::Install => {
                self.store.count_app_install(app.id);
                (self.config.pricing.install_price_cents(app.os), None)
            }
            EventKind::Reg => {
                self.store.count_app_registration(app.id);
                (self.config.pricing.registration_price_cents(app.os), None)
            }
            EventKind::Dep => {
                self.store.count_app_deposit(app.id);
                (self.config.pricing.deposit_price_cents(app.os), event.amount_cents)
            }
            _ => return Ok(()),
        };

        let mut session = self.store.open_session();
        session.stage_transition_and_debit(
            clid.to_string(),
            kind,
            deposit_amount_cents,
            user.id,
            amount_cents,
            format!("conversion {}", format!("{kind:?}").to_lowercase()),
            self.store.get_click(clid).and_then(|c| c.geo),
            Some(app.id),
            Some(app.os),
        );
        if let Err(e) = session.commit() {
            warn!(error = %e, clid, "failed to commit conversion charge");
            return Err(Outcome::Emergency);
        }

        if matches!(kind, EventKind::Install) {
            self.enqueue_mark_non_unique(app.classifier_stream_id.clone(), event.ip.clone(), event.user_agent.clone());
        }
        self.enqueue_save_app_event(clid.to_string(), kind);
        Ok(())
    }

    fn enqueue_send_conversion(&self, clid: String, kind: EventKind) {
        let sinks = self.sinks.clone();
        let store = self.store.clone();
        let job = async move {
            if let Some(click) = store.get_click(&clid) {
                sinks.send_conversion(click, kind).await;
            }
        };
        if self.executor.submit(Box::pin(job)).is_err() {
            warn!("background executor saturated, dropping send_conversion");
        }
    }

    fn enqueue_save_app_event(&self, clid: String, kind: EventKind) {
        let sinks = self.sinks.clone();
        let store = self.store.clone();
        let job = async move {
            if let Some(click) = store.get_click(&clid) {
                sinks.save_app_event(click, kind).await;
            }
        };
        if self.executor.submit(Box::pin(job)).is_err() {
            warn!("background executor saturated, dropping save_app_event");
        }
    }

    fn enqueue_mark_non_unique(&self, stream_id: String, ip: Option<String>, user_agent: Option<String>) {
        let classifier = self.classifier.clone();
        let job = async move {
            classifier
                .mark_non_unique(&stream_id, ip.as_deref(), user_agent.as_deref())
                .await;
        };
        if self.executor.submit(Box::pin(job)).is_err() {
            warn!("background executor saturated, dropping mark_non_unique");
        }
    }
}
