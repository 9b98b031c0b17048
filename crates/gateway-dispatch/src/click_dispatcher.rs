//! Click Dispatcher (C4): top-level handler for web clicks.
//!
//! Ported from `ClickWeb.handle_web_click`. The control flow there threw
//! `SafeAbort`/`SafeAbortAndResponse` to unwind to a terminal branch;
//! here every branch returns an `Outcome` directly, matched by the
//! caller (spec §9's explicit result type).

use crate::landing_cookie;
use crate::offer_url::offer_url_or_error;
use crate::sinks::Sinks;
use chrono::Utc;
use gateway_classifier::{ClassifierClient, Verdict};
use gateway_core::events::WebEvent;
use gateway_core::types::{App, CampaignClick, ClickResult, OperatingSystem};
use gateway_core::Outcome;
use gateway_executor::BackgroundExecutor;
use gateway_selector::{AppSelector, SelectionRequest};
use gateway_store::GatewayStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ClickDispatcher {
    store: Arc<GatewayStore>,
    classifier: Arc<ClassifierClient>,
    executor: Arc<BackgroundExecutor>,
    sinks: Arc<Sinks>,
}

impl ClickDispatcher {
    pub fn new(
        store: Arc<GatewayStore>,
        classifier: Arc<ClassifierClient>,
        executor: Arc<BackgroundExecutor>,
        sinks: Arc<Sinks>,
    ) -> Self {
        Self {
            store,
            classifier,
            executor,
            sinks,
        }
    }

    #[tracing::instrument(
        name = "web_click",
        skip(self, event),
        fields(click_id = %event.clid, campaign_id = tracing::field::Empty)
    )]
    pub async fn dispatch(&self, event: WebEvent) -> Outcome {
        let Some(uchsik) = event.uchsik.clone() else {
            return Outcome::Emergency;
        };

        let Some(campaign) = self.store.get_campaign_by_hash(&uchsik) else {
            warn!(uchsik, "campaign not found");
            return Outcome::Emergency;
        };
        tracing::Span::current().record("campaign_id", campaign.id);

        let selector = AppSelector::new(&self.store, &self.classifier);
        let selection_req = SelectionRequest {
            ip: event.ip.as_deref(),
            user_agent: event.user_agent.as_deref(),
        };
        let psa = event.psa_hint();

        let selector_future = selector.select_relevant_app(&campaign, psa.as_ref(), &selection_req);
        let classifier_future = self.classifier.check_click(
            event.ip.as_deref(),
            event.user_agent.as_deref(),
            None,
            &event.request_parameters,
        );
        let (selected_app, click_check) = tokio::join!(selector_future, classifier_future);

        let click_id = event.clid.clone();

        let click = CampaignClick {
            click_id: click_id.clone(),
            domain: event.host.clone(),
            fbclid: event.fbclid.clone(),
            gclid: event.gclid.clone(),
            ttclid: event.ttclid.clone(),
            click_source: event.click_source,
            rma: event.rma.clone(),
            ulb: event.ulb,
            pay: event.pay,
            kclid: click_check.kclid.clone(),
            clabel: event.clabel.clone(),
            gtag: event.gtag.clone(),
            request_parameters: event.request_parameters.clone(),
            campaign_id: campaign.id,
            app_id: None,
            app_installed: false,
            app_registered: false,
            app_deposited: false,
            appclid: None,
            ip: event.ip.clone(),
            user_agent: event.user_agent.clone(),
            referer: event.referer.clone(),
            created_at: Utc::now(),
            blocked: click_check.verdict == Verdict::Block,
            geo: click_check.geo.clone(),
            city: click_check.city.clone(),
            device: click_check.device.clone(),
            timezone: event.timezone.clone(),
            lat: event.lat,
            long: event.long,
            offer_url: None,
            result: None,
            deposit_amount_cents: None,
        };

        // Persist eagerly, before the redirect decision, so a concurrent
        // app beacon can already find this click by id.
        let mut session = self.store.open_session();
        session.stage_insert_click(click.clone());
        if let Err(e) = session.commit() {
            warn!(error = %e, "failed to persist campaign click");
            return Outcome::Emergency;
        }

        if !campaign.is_active() {
            self.finish(&click_id, ClickResult::Emergency, None);
            return Outcome::Emergency;
        }

        match click_check.verdict {
            Verdict::Error => {
                warn!(click_id, "classifier error, routing to emergency");
                self.finish(&click_id, ClickResult::Emergency, None);
                return Outcome::Emergency;
            }
            Verdict::Block => {
                return self.handle_blocked(&click_id, &campaign);
            }
            Verdict::Pass => {}
        }

        self.enqueue_save_click(click.clone());

        let device_os = click_check
            .device
            .as_deref()
            .map(OperatingSystem::from_device_str)
            .unwrap_or(campaign.os);

        if device_os != campaign.os {
            info!(click_id, "os mismatch, selecting reserve app");
            let reserve = selector.select_reserve_for_os(&campaign, device_os, &selection_req).await;
            return self.app_redirect(&click_id, &campaign, reserve.as_ref());
        }

        if let Some(app) = &selected_app {
            self.store.record_app_visit(campaign.id, app.id);
        }
        self.app_redirect(&click_id, &campaign, selected_app.as_ref())
    }

    fn handle_blocked(&self, click_id: &str, campaign: &gateway_core::types::Campaign) -> Outcome {
        let mut session = self.store.open_session();
        session.stage_set_blocked(click_id, true);
        if let Err(e) = session.commit() {
            warn!(error = %e, "failed to mark click blocked");
        }

        let Some(landing_id) = campaign.landing_id else {
            self.finish(click_id, ClickResult::Emergency, None);
            return Outcome::Emergency;
        };
        let Some(landing) = self.store.get_landing(landing_id) else {
            self.finish(click_id, ClickResult::Emergency, None);
            return Outcome::Emergency;
        };
        if !landing.is_active() {
            self.finish(click_id, ClickResult::Emergency, None);
            return Outcome::Emergency;
        }

        self.finish(click_id, ClickResult::Landing, None);
        let cookie = landing_cookie::mint(landing.id);
        Outcome::RenderLanding {
            landing_id: landing.id,
            cookie: Some(cookie),
        }
    }

    fn app_redirect(
        &self,
        click_id: &str,
        campaign: &gateway_core::types::Campaign,
        app: Option<&App>,
    ) -> Outcome {
        if let Some(app) = app.filter(|a| a.is_active()) {
            let mut session = self.store.open_session();
            session.stage_set_app_id(click_id, app.id);
            session.stage_set_result(click_id, ClickResult::App, None);
            if let Err(e) = session.commit() {
                warn!(error = %e, "failed to record app redirect");
                return Outcome::Emergency;
            }
            self.store.count_app_view(app.id);
            let url = app.redirect_url(click_id);
            if let Some(click) = self.store.get_click(click_id) {
                self.enqueue_save_campaign_event(click, "app_redirect");
            }
            return Outcome::redirect(url);
        }

        if let Some(offer_url) = campaign.offer_url.as_deref() {
            let click = match self.store.get_click(click_id) {
                Some(click) => click,
                None => return Outcome::Emergency,
            };
            let url = match offer_url_or_error(
                Some(offer_url),
                &click.request_parameters,
                &campaign.custom_parameters,
                click_id,
                click.kclid.as_deref(),
            ) {
                Ok(url) => url,
                Err(e) => {
                    warn!(error = %e, "failed to construct offer url");
                    self.finish(click_id, ClickResult::Emergency, None);
                    return Outcome::Emergency;
                }
            };
            self.finish(click_id, ClickResult::Offer, Some(url.clone()));
            self.enqueue_save_campaign_event(click, "offer_redirect");
            return Outcome::redirect(url);
        }

        self.finish(click_id, ClickResult::Emergency, None);
        Outcome::Emergency
    }

    fn finish(&self, click_id: &str, result: ClickResult, offer_url: Option<String>) {
        let mut session = self.store.open_session();
        session.stage_set_result(click_id, result, offer_url);
        if let Err(e) = session.commit() {
            warn!(error = %e, click_id, "failed to finalize click result");
        }
    }

    fn enqueue_save_click(&self, click: CampaignClick) {
        let sinks = self.sinks.clone();
        if self
            .executor
            .submit(Box::pin(async move { sinks.save_click(click).await }))
            .is_err()
        {
            warn!("background executor saturated, dropping save_click");
        }
    }

    fn enqueue_save_campaign_event(&self, click: CampaignClick, event: &'static str) {
        let sinks = self.sinks.clone();
        if self
            .executor
            .submit(Box::pin(async move { sinks.save_campaign_event(click, event).await }))
            .is_err()
        {
            warn!("background executor saturated, dropping save_campaign_event");
        }
    }
}
