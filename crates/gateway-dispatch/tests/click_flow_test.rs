//! End-to-end coverage of the click-dispatch and app-event pipelines,
//! exercising `ClickDispatcher` and `EventCorrelator` directly against a
//! real `GatewayStore` and a `ClassifierClient` pointed at a mocked
//! classifier service, bypassing the HTTP layer entirely.

use gateway_classifier::ClassifierClient;
use gateway_core::config::{ClassifierConfig, GatewayConfig, SinksConfig};
use gateway_core::events::{AppEvent, RawEventKind, WebEvent};
use gateway_core::types::{
    App, AppStat, AppStatus, Campaign, CampaignStatus, ClickSource, Landing, LandingStatus,
    OperatingSystem, User, UserRole, UserStatus,
};
use gateway_core::Outcome;
use gateway_dispatch::landing_cookie;
use gateway_dispatch::{ClickDispatcher, EventCorrelator, Sinks};
use gateway_executor::{BackgroundExecutor, ExecutorConfig};
use gateway_store::GatewayStore;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn small_executor() -> Arc<BackgroundExecutor> {
    Arc::new(BackgroundExecutor::new(ExecutorConfig {
        capacity: 4,
        queue_depth: 32,
        sweep_interval: Duration::from_secs(3600),
    }))
}

fn sample_sinks() -> Arc<Sinks> {
    Arc::new(Sinks::new(SinksConfig::default()))
}

fn sample_user(id: i64, balance_cents: i64, panel_key: &str) -> User {
    User {
        id,
        identity: format!("user-{id}"),
        credential_hash: "hash".to_string(),
        role: UserRole::User,
        status: UserStatus::Active,
        balance_cents,
        stable_hash: format!("userhash-{id}"),
        panel_key: panel_key.to_string(),
    }
}

fn sample_app(id: i64, os: OperatingSystem, url: &str, stream_id: &str) -> App {
    App {
        id,
        title: format!("app-{id}"),
        url: url.to_string(),
        os,
        tags: vec![],
        status: AppStatus::Active,
        classifier_stream_id: stream_id.to_string(),
        views: Default::default(),
        installs: Default::default(),
        registrations: Default::default(),
        deposits: Default::default(),
        price_per_install_cents: 6,
        price_per_registration_cents: 0,
        price_per_deposit_cents: 0,
        allowed_user_ids: vec![1],
        stable_hash: format!("apphash-{id}"),
    }
}

fn sample_campaign(id: i64, owner_user_id: i64, os: OperatingSystem, app_ids: Vec<i64>) -> Campaign {
    Campaign {
        id,
        title: format!("campaign-{id}"),
        owner_user_id,
        subuser_id: None,
        geo: None,
        offer_url: None,
        os,
        app_ids,
        apps_stats: vec![],
        app_tags: vec![],
        landing_id: None,
        custom_parameters: BTreeMap::new(),
        status: CampaignStatus::Active,
        archived: false,
        stable_hash: format!("campaignhash-{id}"),
    }
}

fn sample_web_event(uchsik: &str, host: &str, clid: &str) -> WebEvent {
    WebEvent {
        uchsik: Some(uchsik.to_string()),
        psa: None,
        fbclid: Some("fb1".to_string()),
        gclid: None,
        ttclid: None,
        click_source: ClickSource::Facebook,
        rma: "mobile".to_string(),
        pay: 150,
        ulb: 12345678,
        clabel: None,
        gtag: None,
        user_agent: Some("test-agent".to_string()),
        ip: Some("203.0.113.5".to_string()),
        host: host.to_string(),
        timezone: None,
        utc_offset: None,
        lat: None,
        long: None,
        referer: None,
        clid: clid.to_string(),
        request_parameters: BTreeMap::new(),
    }
}

async fn classifier_against(mock_server: &MockServer) -> Arc<ClassifierClient> {
    let config = ClassifierConfig {
        base_url: mock_server.uri(),
        api_token: "test-token".to_string(),
        timeout_ms: 2000,
    };
    Arc::new(ClassifierClient::new(config).unwrap())
}

/// Scenario 1: a clean web click on a campaign with a single weighted app,
/// device OS matching the campaign's, redirects straight to the app.
#[tokio::test]
async fn happy_web_click_redirects_to_app() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "verdict": "okay", "geo": "US", "city": "Austin", "device": "android", "kclid": "k-1" }
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(GatewayStore::new());
    store.put_user(sample_user(1, 5000, "panel-1"));
    let app = sample_app(10, OperatingSystem::Android, "https://a.example/?id=PANELCLID", "stream-a");
    store.put_app(app);
    let mut campaign = sample_campaign(100, 1, OperatingSystem::Android, vec![10]);
    campaign.apps_stats = vec![AppStat {
        app_id: 10,
        weight: 100,
        visits: 0,
        classifier_stream_id: "stream-a".to_string(),
    }];
    store.put_campaign(campaign);

    let classifier = classifier_against(&mock_server).await;
    let executor = small_executor();
    let sinks = sample_sinks();
    let dispatcher = ClickDispatcher::new(store.clone(), classifier, executor, sinks);

    let event = sample_web_event("campaignhash-100", "track.example", "clickid001");
    let outcome = dispatcher.dispatch(event).await;

    match outcome {
        Outcome::Redirect { to } => assert_eq!(to, "https://a.example/?id=clickid001"),
        other => panic!("expected redirect, got {other:?}"),
    }

    let click = store.get_click("clickid001").expect("click persisted");
    assert!(!click.blocked);
    assert_eq!(click.app_id, Some(10));
    let app = store.get_app(10).unwrap();
    assert_eq!(app.views(), 1);
}

/// Scenario 2: the classifier flags the click as a bot, and the campaign
/// has an active landing to fall back to.
#[tokio::test]
async fn blocked_verdict_renders_landing() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "verdict": "block" }
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(GatewayStore::new());
    store.put_user(sample_user(1, 5000, "panel-1"));
    store.put_landing(Landing {
        id: 20,
        working_directory: "offer20".to_string(),
        status: LandingStatus::Active,
        geo: None,
        tags: vec![],
    });
    let mut campaign = sample_campaign(100, 1, OperatingSystem::Android, vec![]);
    campaign.landing_id = Some(20);
    store.put_campaign(campaign);

    let classifier = classifier_against(&mock_server).await;
    let executor = small_executor();
    let sinks = sample_sinks();
    let dispatcher = ClickDispatcher::new(store.clone(), classifier, executor, sinks);

    let event = sample_web_event("campaignhash-100", "track.example", "clickid002");
    let outcome = dispatcher.dispatch(event).await;

    match outcome {
        Outcome::RenderLanding { landing_id, cookie } => {
            assert_eq!(landing_id, 20);
            let cookie = cookie.expect("cookie set");
            assert_eq!(landing_cookie::landing_id(&cookie), Some(20));
        }
        other => panic!("expected render landing, got {other:?}"),
    }

    let click = store.get_click("clickid002").unwrap();
    assert!(click.blocked);
}

/// Scenario 3: the classifier reports a device OS that doesn't match the
/// campaign's configured OS, so selection falls back to a reserve app for
/// the device's actual OS.
#[tokio::test]
async fn os_mismatch_selects_reserve_app() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(query_param("stream_id", "stream-ios"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "info": { "uniqueness": { "stream": true } }
        })))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": { "verdict": "okay", "geo": "US", "device": "iphone", "kclid": "k-2" }
        })))
        .mount(&mock_server)
        .await;

    let store = Arc::new(GatewayStore::new());
    store.put_user(sample_user(1, 5000, "panel-1"));
    let reserve_app = sample_app(11, OperatingSystem::Ios, "https://ios.example/?id=PANELCLID", "stream-ios");
    store.put_app(reserve_app);
    // Campaign targets Android and doesn't list the iOS reserve app.
    let campaign = sample_campaign(100, 1, OperatingSystem::Android, vec![]);
    store.put_campaign(campaign);

    let classifier = classifier_against(&mock_server).await;
    let executor = small_executor();
    let sinks = sample_sinks();
    let dispatcher = ClickDispatcher::new(store.clone(), classifier, executor, sinks);

    let event = sample_web_event("campaignhash-100", "track.example", "clickid003");
    let outcome = dispatcher.dispatch(event).await;

    match outcome {
        Outcome::Redirect { to } => assert_eq!(to, "https://ios.example/?id=clickid003"),
        other => panic!("expected redirect to reserve app, got {other:?}"),
    }
    let click = store.get_click("clickid003").unwrap();
    assert_eq!(click.app_id, Some(11));
}

fn seed_for_app_events(balance_cents: i64) -> (Arc<GatewayStore>, Arc<GatewayConfig>, String) {
    let store = Arc::new(GatewayStore::new());
    store.put_user(sample_user(1, balance_cents, "panel-1"));
    let app = sample_app(10, OperatingSystem::Android, "https://a.example/?id=PANELCLID", "stream-a");
    store.put_app(app);
    let campaign = sample_campaign(100, 1, OperatingSystem::Android, vec![10]);
    store.put_campaign(campaign);

    let click_id = "clickid004".to_string();
    let event = sample_web_event("campaignhash-100", "track.example", &click_id);
    let mut session = store.open_session();
    let click = gateway_core::types::CampaignClick {
        click_id: click_id.clone(),
        domain: event.host.clone(),
        fbclid: event.fbclid.clone(),
        gclid: None,
        ttclid: None,
        click_source: event.click_source,
        rma: event.rma.clone(),
        ulb: event.ulb,
        pay: event.pay,
        kclid: Some("k-1".to_string()),
        clabel: None,
        gtag: None,
        request_parameters: BTreeMap::new(),
        campaign_id: 100,
        app_id: Some(10),
        app_installed: false,
        app_registered: false,
        app_deposited: false,
        appclid: None,
        ip: event.ip.clone(),
        user_agent: event.user_agent.clone(),
        referer: None,
        created_at: chrono::Utc::now(),
        blocked: false,
        geo: Some("US".to_string()),
        city: None,
        device: Some("android".to_string()),
        timezone: None,
        lat: None,
        long: None,
        offer_url: None,
        result: Some(gateway_core::types::ClickResult::App),
        deposit_amount_cents: None,
    };
    session.stage_insert_click(click);
    session.commit().unwrap();

    (store, Arc::new(GatewayConfig::default()), click_id)
}

fn sample_app_event(clid: &str, kind: RawEventKind, key: Option<&str>) -> AppEvent {
    AppEvent {
        clid: Some(clid.to_string()),
        appclid: None,
        pay: None,
        event: kind,
        key: key.map(str::to_string),
        amount_cents: None,
        user_agent: Some("test-agent".to_string()),
        ip: Some("203.0.113.5".to_string()),
        city: None,
        country: None,
    }
}

/// Scenario 4: a first install beacon debits the configured install price
/// and flips the click's `app_installed` flag.
#[tokio::test]
async fn install_beacon_debits_once() {
    let (store, config, clid) = seed_for_app_events(5000);
    let mock_server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&mock_server).await;
    let classifier = classifier_against(&mock_server).await;
    let executor = small_executor();
    let sinks = sample_sinks();
    let correlator = EventCorrelator::new(store.clone(), classifier, executor, sinks, config);

    let event = sample_app_event(&clid, RawEventKind::Install, None);
    let outcome = correlator.handle(event).await;
    assert!(matches!(outcome, Outcome::Redirect { .. } | Outcome::Emergency));

    let user = store.get_user(1).unwrap();
    assert_eq!(user.balance_cents, 5000 - 6);
    let click = store.get_click(&clid).unwrap();
    assert!(click.app_installed);
}

/// Scenario 5: a duplicate install beacon is rewritten to a non-chargeable
/// `entry` and must not debit a second time.
#[tokio::test]
async fn duplicate_install_beacon_does_not_debit_again() {
    let (store, config, clid) = seed_for_app_events(5000);
    let mock_server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&mock_server).await;
    let classifier = classifier_against(&mock_server).await;
    let executor = small_executor();
    let sinks = sample_sinks();
    let correlator = EventCorrelator::new(store.clone(), classifier, executor, sinks, config);

    let first = sample_app_event(&clid, RawEventKind::Install, None);
    correlator.handle(first).await;
    let balance_after_first = store.get_user(1).unwrap().balance_cents;
    assert_eq!(balance_after_first, 5000 - 6);

    let second = sample_app_event(&clid, RawEventKind::Install, None);
    correlator.handle(second).await;
    let balance_after_second = store.get_user(1).unwrap().balance_cents;
    assert_eq!(balance_after_second, balance_after_first);
}

/// Scenario 6: a deposit beacon without a panel key is rejected before any
/// charge is considered.
#[tokio::test]
async fn deposit_beacon_without_key_is_rejected() {
    let (store, config, clid) = seed_for_app_events(5000);
    let mock_server = MockServer::start().await;
    Mock::given(method("GET")).respond_with(ResponseTemplate::new(200)).mount(&mock_server).await;
    let classifier = classifier_against(&mock_server).await;
    let executor = small_executor();
    let sinks = sample_sinks();
    let correlator = EventCorrelator::new(store, classifier, executor, sinks, config);

    let event = sample_app_event(&clid, RawEventKind::Dep, None);
    let outcome = correlator.handle(event).await;

    match outcome {
        Outcome::JsonError { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "No key provided.");
        }
        other => panic!("expected a 400 json error, got {other:?}"),
    }
}
