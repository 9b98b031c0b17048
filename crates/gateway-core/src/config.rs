use serde::Deserialize;

/// Root configuration, loaded from environment variables with the prefix
/// `GATEWAY__` (double underscore separates nesting), mirroring the
/// teacher's `AppConfig::load()`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_tag")]
    pub service_tag: String,
    #[serde(default = "default_timezone")]
    pub time_zone: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub hosts: HostsConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sinks: SinksConfig,
    #[serde(default)]
    pub assets: AssetsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

/// Host-routing config: which hosts are in-app (routed to the App Event
/// Correlator instead of the Click Dispatcher) and which of those forces
/// `event=install` regardless of the query string.
#[derive(Debug, Clone, Deserialize)]
pub struct HostsConfig {
    #[serde(default = "default_in_app_hosts")]
    pub in_app_hosts: Vec<String>,
    #[serde(default = "default_flow_host")]
    pub flow_host: String,
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            in_app_hosts: default_in_app_hosts(),
            flow_host: default_flow_host(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_classifier_url")]
    pub base_url: String,
    #[serde(default = "default_classifier_token")]
    pub api_token: String,
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_url: default_classifier_url(),
            api_token: default_classifier_token(),
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_executor_capacity")]
    pub capacity: usize,
    #[serde(default = "default_executor_queue_depth")]
    pub queue_depth: usize,
    #[serde(default = "default_executor_task_timeout_ms")]
    pub task_timeout_ms: u64,
    #[serde(default = "default_executor_shutdown_deadline_ms")]
    pub shutdown_deadline_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            capacity: default_executor_capacity(),
            queue_depth: default_executor_queue_depth(),
            task_timeout_ms: default_executor_task_timeout_ms(),
            shutdown_deadline_ms: default_executor_shutdown_deadline_ms(),
        }
    }
}

/// Per-OS conversion pricing. Defaults match the original system's literal
/// config values.
#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    #[serde(default = "default_install_price_android")]
    pub install_price_android_cents: i64,
    #[serde(default = "default_install_price_ios")]
    pub install_price_ios_cents: i64,
    #[serde(default = "default_zero_price")]
    pub registration_price_android_cents: i64,
    #[serde(default = "default_zero_price")]
    pub registration_price_ios_cents: i64,
    #[serde(default = "default_zero_price")]
    pub deposit_price_android_cents: i64,
    #[serde(default = "default_zero_price")]
    pub deposit_price_ios_cents: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            install_price_android_cents: default_install_price_android(),
            install_price_ios_cents: default_install_price_ios(),
            registration_price_android_cents: default_zero_price(),
            registration_price_ios_cents: default_zero_price(),
            deposit_price_android_cents: default_zero_price(),
            deposit_price_ios_cents: default_zero_price(),
        }
    }
}

impl PricingConfig {
    pub fn install_price_cents(&self, os: crate::types::OperatingSystem) -> i64 {
        match os {
            crate::types::OperatingSystem::Android => self.install_price_android_cents,
            crate::types::OperatingSystem::Ios => self.install_price_ios_cents,
        }
    }

    pub fn registration_price_cents(&self, os: crate::types::OperatingSystem) -> i64 {
        match os {
            crate::types::OperatingSystem::Android => self.registration_price_android_cents,
            crate::types::OperatingSystem::Ios => self.registration_price_ios_cents,
        }
    }

    pub fn deposit_price_cents(&self, os: crate::types::OperatingSystem) -> i64 {
        match os {
            crate::types::OperatingSystem::Android => self.deposit_price_android_cents,
            crate::types::OperatingSystem::Ios => self.deposit_price_ios_cents,
        }
    }
}

/// Base URLs for the background-only outbound collaborators: conversion/
/// click forwarding, stats, and the user-attribution fallback lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct SinksConfig {
    #[serde(default = "default_event_service_url")]
    pub event_service_base_url: String,
    #[serde(default = "default_user_attribution_url")]
    pub user_attribution_base_url: String,
    #[serde(default = "default_stats_service_url")]
    pub stats_service_base_url: String,
}

impl Default for SinksConfig {
    fn default() -> Self {
        Self {
            event_service_base_url: default_event_service_url(),
            user_attribution_base_url: default_user_attribution_url(),
            stats_service_base_url: default_stats_service_url(),
        }
    }
}

/// Filesystem roots for the Landing Asset Server: `templates_dir` holds
/// per-landing working directories, `static_dir` is the shared fallback,
/// `emergency_page` is served whenever no other terminal branch applies.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    #[serde(default = "default_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "default_static_dir")]
    pub static_dir: String,
    #[serde(default = "default_emergency_page")]
    pub emergency_page: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            templates_dir: default_templates_dir(),
            static_dir: default_static_dir(),
            emergency_page: default_emergency_page(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            port: default_metrics_port(),
        }
    }
}

fn default_service_name() -> String {
    "click-dispatch-gateway".to_string()
}
fn default_service_tag() -> String {
    "gateway".to_string()
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_in_app_hosts() -> Vec<String> {
    vec!["flow.example".to_string(), "events.example".to_string()]
}
fn default_flow_host() -> String {
    "flow.example".to_string()
}
fn default_classifier_url() -> String {
    "http://localhost:9100/click_api/v3".to_string()
}
fn default_classifier_token() -> String {
    "changeme".to_string()
}
fn default_classifier_timeout_ms() -> u64 {
    200
}
fn default_executor_capacity() -> usize {
    5
}
fn default_executor_queue_depth() -> usize {
    512
}
fn default_executor_task_timeout_ms() -> u64 {
    1000
}
fn default_executor_shutdown_deadline_ms() -> u64 {
    2000
}
fn default_install_price_android() -> i64 {
    6
}
fn default_install_price_ios() -> i64 {
    10
}
fn default_zero_price() -> i64 {
    0
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_event_service_url() -> String {
    "http://localhost:9200".to_string()
}
fn default_user_attribution_url() -> String {
    "http://localhost:9300".to_string()
}
fn default_stats_service_url() -> String {
    "http://localhost:9400".to_string()
}
fn default_templates_dir() -> String {
    "templates".to_string()
}
fn default_static_dir() -> String {
    "static".to_string()
}
fn default_emergency_page() -> String {
    "static/emergency.html".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            service_tag: default_service_tag(),
            time_zone: default_timezone(),
            api: ApiConfig::default(),
            hosts: HostsConfig::default(),
            classifier: ClassifierConfig::default(),
            executor: ExecutorConfig::default(),
            pricing: PricingConfig::default(),
            metrics: MetricsConfig::default(),
            sinks: SinksConfig::default(),
            assets: AssetsConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from environment variables prefixed `GATEWAY__`.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("GATEWAY")
                .separator("__")
                .try_parsing(true)
                .list_separator(","),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    pub fn time_zone(&self) -> chrono_tz::Tz {
        self.time_zone.parse().unwrap_or(chrono_tz::UTC)
    }
}
