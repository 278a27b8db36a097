pub mod auth;
pub mod config;
pub mod server;
pub mod state;
pub mod todos_api;

pub use config::GatewayConfig;
pub use state::AppState;
