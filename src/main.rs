use axum::{
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

use livreo_backend::api::{self, AppState};
use livreo_backend::auth::TokenService;
use livreo_backend::config::AppConfig;
use livreo_backend::database;
use livreo_backend::health::{HealthChecker, HealthStatus};
use livreo_backend::logging::init_tracing;
use livreo_backend::middleware::logging::{request_logging_middleware, UuidRequestId};
use livreo_backend::middleware::rate_limit::RateLimiter;
use livreo_backend::payments::factory::PaymentProviderFactory;
use livreo_backend::services::{
    CampaignAggregator, ContributionLifecycleService, NotificationService, OrderLifecycleService,
    ReconciliationLedger,
};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration error: {e}"))?;

    init_tracing(&config.logging);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        "🚀 Starting Livreo payment backend"
    );

    info!("📊 Initializing database connection pool...");
    let db_pool = database::init_pool_from_config(&config.database)
        .await
        .map_err(|e| {
            error!("Failed to initialize database pool: {}", e);
            anyhow::anyhow!("database error: {e}")
        })?;
    info!("✅ Database connection pool initialized");

    let provider_factory = Arc::new(PaymentProviderFactory::from_env().map_err(|e| {
        error!("Failed to initialize payment provider factory: {}", e);
        anyhow::anyhow!("payment configuration error: {e}")
    })?);

    let orders_repo = Arc::new(database::order_repository::OrderRepository::new(
        db_pool.clone(),
    ));
    let contributions_repo = Arc::new(
        database::contribution_repository::ContributionRepository::new(db_pool.clone()),
    );
    let books_repo = Arc::new(database::book_repository::BookRepository::new(
        db_pool.clone(),
    ));
    let users_repo = Arc::new(database::user_repository::UserRepository::new(
        db_pool.clone(),
    ));
    let ledger_repo = Arc::new(database::ledger_repository::LedgerRepository::new(
        db_pool.clone(),
    ));

    let ledger = Arc::new(ReconciliationLedger::new(ledger_repo));
    let notifications = Arc::new(NotificationService::new());
    let orders = Arc::new(OrderLifecycleService::new(
        orders_repo,
        books_repo.clone(),
        ledger.clone(),
        provider_factory.clone(),
        config.checkout.clone(),
        notifications.clone(),
    ));
    let contributions = Arc::new(ContributionLifecycleService::new(
        contributions_repo.clone(),
        books_repo.clone(),
        ledger.clone(),
        provider_factory.clone(),
        config.checkout.clone(),
        notifications,
    ));
    let aggregator = Arc::new(CampaignAggregator::new(books_repo, contributions_repo));

    let state = AppState {
        tokens: Arc::new(TokenService::from_config(&config.auth)),
        users: users_repo,
        orders,
        contributions,
        aggregator,
        ledger,
        providers: provider_factory,
        limiter: Arc::new(RateLimiter::in_memory()),
        rate_limits: config.rate_limit.clone(),
        auth: config.auth.clone(),
        health: HealthChecker::new(db_pool),
    };

    info!("🛣️  Setting up application routes...");
    let app = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/api/auth/login", post(api::auth::login))
        .route("/api/auth/logout", post(api::auth::logout))
        .route("/api/auth/me", get(api::auth::me))
        .route(
            "/api/orders",
            post(api::orders::create_order).get(api::orders::list_orders),
        )
        .route("/api/orders/{id}", get(api::orders::get_order))
        .route("/api/orders/{id}/cancel", post(api::orders::cancel_order))
        .route(
            "/api/orders/{id}/retry-payment",
            post(api::orders::retry_payment),
        )
        .route(
            "/api/orders/{id}/checkout/{provider}",
            post(api::orders::checkout_order),
        )
        .route(
            "/api/contributions",
            post(api::contributions::create_contribution),
        )
        .route(
            "/api/contributions/{id}/checkout/{provider}",
            post(api::contributions::checkout_contribution),
        )
        .route("/api/webhooks/{provider}", post(api::webhooks::handle_webhook))
        .route("/api/campaigns/{book_id}", get(api::campaigns::get_snapshot))
        .route(
            "/api/campaigns/{book_id}/stream",
            get(api::campaigns::stream_snapshots),
        )
        .route("/api/admin/ledger", get(api::admin::list_ledger))
        .route(
            "/api/admin/ledger/{related_id}",
            get(api::admin::ledger_for_related),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        );
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("👋 Server shutdown complete");

    Ok(())
}

async fn root() -> &'static str {
    "Welcome to the Livreo API"
}

async fn health(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    let health_status = state.health.check_health().await;

    if health_status.is_healthy() {
        Ok(Json(health_status))
    } else {
        error!("❌ Health check failed - service unhealthy");
        Err((
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            "Service Unavailable".to_string(),
        ))
    }
}

/// Readiness probe - checks if the service is ready to accept traffic
async fn readiness(
    state: axum::extract::State<AppState>,
) -> Result<Json<HealthStatus>, (axum::http::StatusCode, String)> {
    health(state).await
}

/// Liveness probe - checks if the service is alive (basic check)
async fn liveness() -> &'static str {
    "OK"
}
