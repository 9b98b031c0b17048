//! App Selector (C3): picks which installed app a campaign click should
//! land on.
//!
//! Ported from the original `AppsBalancer`: PSA override first, then
//! weighted pacing over `apps_stats`, then tag fallback, then an
//! OS-matched reserve app excluded from the campaign's own app list.
//! Per-candidate uniqueness is delegated to the classifier's
//! `check_unique_app_user`, same as the original's `KeitaroApi` calls.

use gateway_classifier::ClassifierClient;
use gateway_core::types::{App, Campaign, OperatingSystem};
use gateway_store::GatewayStore;
use tracing::info;

/// An app with zero visits is never overvisited; otherwise its visit
/// share must not exceed its weight share.
fn is_overvisited(visits: u64, weight: u32, total_visits: u64, total_weight: u64) -> bool {
    if visits == 0 || total_weight == 0 {
        return false;
    }
    (visits as f64 / total_visits as f64) > (weight as f64 / total_weight as f64)
}

pub struct SelectionRequest<'a> {
    pub ip: Option<&'a str>,
    pub user_agent: Option<&'a str>,
}

pub struct AppSelector<'a> {
    store: &'a GatewayStore,
    classifier: &'a ClassifierClient,
}

impl<'a> AppSelector<'a> {
    pub fn new(store: &'a GatewayStore, classifier: &'a ClassifierClient) -> Self {
        Self { store, classifier }
    }

    /// Selects the app a click should be attributed to, or `None` if no
    /// candidate survives (callers fall through to emergency).
    pub async fn select_relevant_app(
        &self,
        campaign: &Campaign,
        psa: Option<&gateway_core::events::Psa>,
        req: &SelectionRequest<'_>,
    ) -> Option<App> {
        if let Some(psa) = psa {
            if let Some(app) = self.select_app_by_psa(campaign, psa, req).await {
                info!(app_id = app.id, "selected app by psa");
                return Some(app);
            }
        }

        if !campaign.apps_stats.is_empty() {
            if let Some(app) = self.select_app_by_weight(campaign, req).await {
                info!(app_id = app.id, "selected app by weight");
                return Some(app);
            }
        } else if !campaign.app_tags.is_empty() {
            for tag in &campaign.app_tags {
                if let Some(app) = self.select_app_by_tag(campaign, tag, req).await {
                    info!(app_id = app.id, tag, "selected app by tag");
                    return Some(app);
                }
            }
        }

        let reserve = self.select_reserve_app(campaign, campaign.os, req).await;
        if let Some(app) = &reserve {
            info!(app_id = app.id, "selected reserve app");
        }
        reserve
    }

    async fn select_app_by_psa(
        &self,
        campaign: &Campaign,
        psa: &gateway_core::events::Psa,
        req: &SelectionRequest<'_>,
    ) -> Option<App> {
        match psa {
            gateway_core::events::Psa::AppId(id) => self.store.get_app(*id).filter(App::is_active),
            gateway_core::events::Psa::Tag(tag) => self.select_app_by_tag(campaign, tag, req).await,
        }
    }

    async fn select_app_by_weight(
        &self,
        campaign: &Campaign,
        req: &SelectionRequest<'_>,
    ) -> Option<App> {
        let mut candidates: Vec<_> = campaign
            .apps_stats
            .iter()
            .filter(|stat| stat.weight > 0)
            .filter_map(|stat| {
                let app = self.store.get_app(stat.app_id)?;
                if !app.is_active() || app.os != campaign.os {
                    return None;
                }
                if !app.is_allowed_for(campaign.owner_user_id) {
                    return None;
                }
                Some((app, stat.clone()))
            })
            .collect();

        if candidates.is_empty() {
            return None;
        }
        candidates.sort_by_key(|(_, stat)| stat.visits);

        let total_visits: u64 = candidates.iter().map(|(_, s)| s.visits).sum();
        let total_weight: u64 = candidates.iter().map(|(_, s)| s.weight as u64).sum();

        if total_visits == 0 {
            return candidates.into_iter().next().map(|(app, _)| app);
        }

        for (app, stat) in &candidates {
            if is_overvisited(stat.visits, stat.weight, total_visits, total_weight) {
                continue;
            }
            if self
                .classifier
                .check_unique_app_user(&app.classifier_stream_id, req.ip, req.user_agent)
                .await
            {
                return Some(app.clone());
            }
        }
        None
    }

    async fn select_app_by_tag(
        &self,
        campaign: &Campaign,
        tag: &str,
        req: &SelectionRequest<'_>,
    ) -> Option<App> {
        let mut apps = self.store.apps_by_tag(tag);
        apps.sort_by_key(|app| app.views());
        for app in apps {
            if !app.is_active() || app.os != campaign.os {
                continue;
            }
            if !app.is_allowed_for(campaign.owner_user_id) {
                continue;
            }
            if self
                .classifier
                .check_unique_app_user(&app.classifier_stream_id, req.ip, req.user_agent)
                .await
            {
                return Some(app);
            }
        }
        None
    }

    /// Reserve selection for a specific OS, independent of the campaign's
    /// own OS — used when the device's actual OS doesn't match the
    /// campaign's configured one.
    pub async fn select_reserve_for_os(
        &self,
        campaign: &Campaign,
        os: OperatingSystem,
        req: &SelectionRequest<'_>,
    ) -> Option<App> {
        self.select_reserve_app(campaign, os, req).await
    }

    async fn select_reserve_app(
        &self,
        campaign: &Campaign,
        os: OperatingSystem,
        req: &SelectionRequest<'_>,
    ) -> Option<App> {
        let mut apps = self.store.apps_by_os(os);
        apps.retain(|app| app.is_active() && !campaign.app_ids.contains(&app.id));
        apps.sort_by_key(|app| app.views());
        for app in apps {
            if self
                .classifier
                .check_unique_app_user(&app.classifier_stream_id, req.ip, req.user_agent)
                .await
            {
                return Some(app);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_visits_is_never_overvisited() {
        assert!(!is_overvisited(0, 10, 100, 100));
    }

    #[test]
    fn visit_share_exceeding_weight_share_is_overvisited() {
        // 80/100 visits vs 10/100 weight share.
        assert!(is_overvisited(80, 10, 100, 100));
    }

    #[test]
    fn visit_share_within_weight_share_is_not_overvisited() {
        // 40/100 visits vs 50/100 weight share.
        assert!(!is_overvisited(40, 50, 100, 100));
    }

    #[test]
    fn zero_total_weight_is_never_overvisited() {
        assert!(!is_overvisited(10, 0, 10, 0));
    }
}
