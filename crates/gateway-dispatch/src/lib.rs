pub mod click_dispatcher;
pub mod event_correlator;
pub mod landing_cookie;
pub mod offer_url;
pub mod sinks;

pub use click_dispatcher::ClickDispatcher;
pub use event_correlator::EventCorrelator;
pub use sinks::Sinks;
