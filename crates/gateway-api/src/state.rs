//! Shared application state handed to every handler.

use gateway_classifier::ClassifierClient;
use gateway_core::GatewayConfig;
use gateway_dispatch::{ClickDispatcher, EventCorrelator, Sinks};
use gateway_executor::BackgroundExecutor;
use gateway_store::GatewayStore;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub store: Arc<GatewayStore>,
    pub classifier: Arc<ClassifierClient>,
    pub executor: Arc<BackgroundExecutor>,
    pub sinks: Arc<Sinks>,
    pub dispatcher: Arc<ClickDispatcher>,
    pub correlator: Arc<EventCorrelator>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let store = Arc::new(GatewayStore::new());
        let classifier = Arc::new(ClassifierClient::new(config.classifier.clone())?);
        let executor = Arc::new(BackgroundExecutor::new((&config.executor).into()));
        let sinks = Arc::new(Sinks::new(config.sinks.clone()));

        let dispatcher = Arc::new(ClickDispatcher::new(
            store.clone(),
            classifier.clone(),
            executor.clone(),
            sinks.clone(),
        ));
        let correlator = Arc::new(EventCorrelator::new(
            store.clone(),
            classifier.clone(),
            executor.clone(),
            sinks.clone(),
            config.clone(),
        ));

        Ok(Self {
            config,
            store,
            classifier,
            executor,
            sinks,
            dispatcher,
            correlator,
            start_time: Instant::now(),
        })
    }
}
