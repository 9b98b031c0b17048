pub mod store;

pub use store::{GatewayStore, Session};

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gateway_core::types::*;
    use std::collections::BTreeMap;

    fn sample_click(click_id: &str, campaign_id: i64) -> CampaignClick {
        CampaignClick {
            click_id: click_id.to_string(),
            domain: "flow.example".to_string(),
            fbclid: None,
            gclid: None,
            ttclid: None,
            click_source: ClickSource::None,
            rma: "r".to_string(),
            ulb: 1234,
            pay: 150,
            kclid: Some("k1".to_string()),
            clabel: None,
            gtag: None,
            request_parameters: BTreeMap::new(),
            campaign_id,
            app_id: None,
            app_installed: false,
            app_registered: false,
            app_deposited: false,
            appclid: None,
            ip: None,
            user_agent: None,
            referer: None,
            created_at: Utc::now(),
            blocked: false,
            geo: None,
            city: None,
            device: None,
            timezone: None,
            lat: None,
            long: None,
            offer_url: None,
            result: None,
            deposit_amount_cents: None,
        }
    }

    fn sample_user(id: i64, balance_cents: i64) -> User {
        User {
            id,
            identity: "u".to_string(),
            credential_hash: "h".to_string(),
            role: UserRole::User,
            status: UserStatus::Active,
            balance_cents,
            stable_hash: "hash".to_string(),
            panel_key: "panel-key".to_string(),
        }
    }

    #[test]
    fn mint_click_id_avoids_collisions() {
        let store = GatewayStore::new();
        let mut ids = std::collections::HashSet::new();
        for _ in 0..50 {
            let id = store.mint_click_id().unwrap();
            assert!(ids.insert(id.clone()));
            let mut session = store.open_session();
            session.stage_insert_click(sample_click(&id, 1));
            session.commit().unwrap();
        }
        assert_eq!(ids.len(), 50);
    }

    #[test]
    fn uncommitted_session_leaves_no_trace() {
        let store = GatewayStore::new();
        {
            let mut session = store.open_session();
            session.stage_insert_click(sample_click("abc1234567", 1));
        }
        assert!(store.get_click("abc1234567").is_none());
    }

    #[test]
    fn committed_session_makes_click_visible() {
        let store = GatewayStore::new();
        let mut session = store.open_session();
        session.stage_insert_click(sample_click("abc1234567", 1));
        session.commit().unwrap();
        assert!(store.get_click("abc1234567").is_some());
    }

    #[test]
    fn transition_and_debit_charges_exactly_once() {
        let store = GatewayStore::new();
        store.put_user(sample_user(9, 500));
        let mut session = store.open_session();
        session.stage_insert_click(sample_click("abc1234567", 1));
        session.commit().unwrap();

        let mut session = store.open_session();
        session.stage_transition_and_debit(
            "abc1234567",
            EventKind::Install,
            None,
            9,
            6,
            "conversion install".to_string(),
            None,
            None,
            Some(OperatingSystem::Android),
        );
        session.commit().unwrap();

        let user = store.get_user(9).unwrap();
        assert_eq!(user.balance_cents, 494);
        let click = store.get_click("abc1234567").unwrap();
        assert!(click.app_installed);
    }

    #[test]
    fn record_app_visit_initializes_even_weights_on_first_use() {
        let store = GatewayStore::new();
        store.put_campaign(Campaign {
            id: 1,
            title: "c".to_string(),
            owner_user_id: 9,
            subuser_id: None,
            geo: None,
            offer_url: None,
            os: OperatingSystem::Android,
            app_ids: vec![10, 11],
            apps_stats: vec![],
            app_tags: vec![],
            landing_id: None,
            custom_parameters: BTreeMap::new(),
            status: CampaignStatus::Active,
            archived: false,
            stable_hash: "h".to_string(),
        });
        store.record_app_visit(1, 10);
        let campaign = store.get_campaign(1).unwrap();
        assert_eq!(campaign.apps_stats.len(), 2);
        assert_eq!(campaign.apps_stats[0].weight, 50);
        assert_eq!(campaign.apps_stats[0].visits, 1);
        assert_eq!(campaign.apps_stats[1].visits, 0);
    }
}
