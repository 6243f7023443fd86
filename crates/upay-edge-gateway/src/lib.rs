pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::OrderGateway;
pub use state::AppState;
