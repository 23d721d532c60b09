use aventon_settlement::SettlementCoordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub expiration: u64,
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SettlementCoordinator>,
    pub auth: AuthConfig,
    pub business_rules: aventon_store::app_config::BusinessRules,
}
