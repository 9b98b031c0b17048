//! Offer URL construction, shared by the web-click and app-beacon paths.
//!
//! Ported from `CampaignClickController.make_offer_url`: prepend a scheme
//! if the campaign's offer URL has none, merge the offer URL's own query
//! string with the request query map and the campaign's custom parameters,
//! then force `clid`/`kclid` on top so they always win a key collision.

use gateway_core::{GatewayError, GatewayResult};
use std::collections::BTreeMap;
use url::Url;

pub fn make_offer_url(
    offer_url: &str,
    request_parameters: &BTreeMap<String, String>,
    custom_parameters: &BTreeMap<String, String>,
    clid: &str,
    kclid: Option<&str>,
) -> GatewayResult<String> {
    let with_scheme = if offer_url.starts_with("http://") || offer_url.starts_with("https://") {
        offer_url.to_string()
    } else {
        format!("https://{offer_url}")
    };

    let mut url = Url::parse(&with_scheme)?;

    let mut merged: BTreeMap<String, String> = BTreeMap::new();
    for (k, v) in url.query_pairs() {
        merged.insert(k.into_owned(), v.into_owned());
    }
    for (k, v) in request_parameters {
        merged.insert(k.clone(), v.clone());
    }
    for (k, v) in custom_parameters {
        merged.insert(k.clone(), v.clone());
    }
    merged.insert("clid".to_string(), clid.to_string());
    if let Some(kclid) = kclid {
        merged.insert("kclid".to_string(), kclid.to_string());
    }

    url.query_pairs_mut().clear().extend_pairs(merged.iter());
    Ok(url.to_string())
}

pub fn offer_url_or_error(
    offer_url: Option<&str>,
    request_parameters: &BTreeMap<String, String>,
    custom_parameters: &BTreeMap<String, String>,
    clid: &str,
    kclid: Option<&str>,
) -> GatewayResult<String> {
    let offer_url = offer_url.ok_or_else(|| GatewayError::NotFound("offer url".to_string()))?;
    make_offer_url(offer_url, request_parameters, custom_parameters, clid, kclid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepends_https_when_scheme_missing() {
        let url = make_offer_url("offers.example/path", &BTreeMap::new(), &BTreeMap::new(), "c1", None).unwrap();
        assert!(url.starts_with("https://offers.example/path"));
    }

    #[test]
    fn clid_and_kclid_win_over_request_parameters() {
        let mut req = BTreeMap::new();
        req.insert("clid".to_string(), "stale".to_string());
        req.insert("other".to_string(), "value".to_string());
        let url = make_offer_url("https://offers.example", &req, &BTreeMap::new(), "fresh", Some("k9")).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: BTreeMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("clid"), Some(&"fresh".to_string()));
        assert_eq!(pairs.get("kclid"), Some(&"k9".to_string()));
        assert_eq!(pairs.get("other"), Some(&"value".to_string()));
    }

    #[test]
    fn custom_parameters_override_request_parameters() {
        let mut req = BTreeMap::new();
        req.insert("geo".to_string(), "us".to_string());
        let mut custom = BTreeMap::new();
        custom.insert("geo".to_string(), "ua".to_string());
        let url = make_offer_url("https://offers.example", &req, &custom, "c1", None).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: BTreeMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("geo"), Some(&"ua".to_string()));
    }

    #[test]
    fn preserves_offer_urls_own_query_params() {
        let mut req = BTreeMap::new();
        req.insert("utm_source".to_string(), "fb".to_string());
        let url = make_offer_url(
            "https://offers.example/path?pid=9&aff=xyz",
            &req,
            &BTreeMap::new(),
            "c1",
            None,
        )
        .unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: BTreeMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("pid"), Some(&"9".to_string()));
        assert_eq!(pairs.get("aff"), Some(&"xyz".to_string()));
        assert_eq!(pairs.get("utm_source"), Some(&"fb".to_string()));
        assert_eq!(pairs.get("clid"), Some(&"c1".to_string()));
    }

    #[test]
    fn request_parameters_override_offer_urls_own_query_params() {
        let mut req = BTreeMap::new();
        req.insert("pid".to_string(), "override".to_string());
        let url = make_offer_url("https://offers.example?pid=9", &req, &BTreeMap::new(), "c1", None).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: BTreeMap<_, _> = parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs.get("pid"), Some(&"override".to_string()));
    }
}
