pub mod admin;
pub mod auth;
pub mod campaigns;
pub mod contributions;
pub mod orders;
pub mod webhooks;

use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::{AuthConfig, RateLimitConfig};
use crate::database::user_repository::UserRepository;
use crate::health::HealthChecker;
use crate::middleware::rate_limit::RateLimiter;
use crate::payments::factory::PaymentProviderFactory;
use crate::services::{
    CampaignAggregator, ContributionLifecycleService, OrderLifecycleService, ReconciliationLedger,
};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenService>,
    pub users: Arc<UserRepository>,
    pub orders: Arc<OrderLifecycleService>,
    pub contributions: Arc<ContributionLifecycleService>,
    pub aggregator: Arc<CampaignAggregator>,
    pub ledger: Arc<ReconciliationLedger>,
    pub providers: Arc<PaymentProviderFactory>,
    pub limiter: Arc<RateLimiter>,
    pub rate_limits: RateLimitConfig,
    pub auth: AuthConfig,
    pub health: HealthChecker,
}

// Lets the session extractors pull the token service out of the state.
impl FromRef<AppState> for Arc<TokenService> {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}
