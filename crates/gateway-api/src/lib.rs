pub mod extractor;
pub mod handlers;
pub mod response;
pub mod server;
pub mod state;

pub use server::GatewayApiServer;
pub use state::AppState;
