use std::sync::Arc;

use {ticklist_oidc::AuthFlow, ticklist_todos::TodoStore};

use crate::config::GatewayConfig;

/// Shared per-process state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub flow: Arc<AuthFlow>,
    pub todos: Arc<dyn TodoStore>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(flow: AuthFlow, todos: Arc<dyn TodoStore>, config: GatewayConfig) -> Self {
        Self {
            flow: Arc::new(flow),
            todos,
            config: Arc::new(config),
        }
    }
}
