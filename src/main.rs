//! Subscription ledger service.
//!
//! Serves the billing API and gateway webhooks, and runs the expiry sweep on
//! an interval when configured.

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use subscription_ledger::adapters::http::{
    billing_router, BillingAppState, BillingPorts, HttpPolicy,
};
use subscription_ledger::adapters::{
    InMemoryPlanCodeCache, PaystackConfig, PaystackGateway, PostgresPlanBindingRepository,
    PostgresSettlementStore, PostgresSubscriptionRepository, PostgresTierRepository,
    PostgresUserDirectory, RedisPlanCodeCache, TracingNotifier,
};
use subscription_ledger::application::SweepExpiredHandler;
use subscription_ledger::config::{AppConfig, ServerConfig};
use subscription_ledger::ports::PlanCodeCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load().context("loading configuration")?;
    init_tracing(&config.server);
    config.validate().context("validating configuration")?;

    tracing::info!(
        environment = ?config.server.environment,
        test_mode = config.payment.is_test_mode(),
        "Starting subscription ledger"
    );

    let pool = config
        .database
        .pool_options()
        .connect(&config.database.url)
        .await
        .context("connecting to Postgres")?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!("Migrations applied");
    }

    let plan_cache: Arc<dyn PlanCodeCache> = if config.redis.is_enabled() {
        let client = redis::Client::open(config.redis.url.as_str())?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .context("connecting to Redis")?;
        Arc::new(
            RedisPlanCodeCache::new(conn)
                .with_prefix(config.redis.key_prefix.clone())
                .with_ttl(config.redis.plan_code_ttl()),
        )
    } else {
        tracing::warn!("Redis not configured, plan codes cached per process");
        Arc::new(InMemoryPlanCodeCache::new())
    };

    let gateway = PaystackGateway::new(
        PaystackConfig::new(config.payment.api_key())
            .with_base_url(config.payment.base_url.clone())
            .with_timeout(config.payment.timeout()),
    )?;

    let ports = BillingPorts {
        users: Arc::new(PostgresUserDirectory::new(pool.clone())),
        tiers: Arc::new(PostgresTierRepository::new(pool.clone())),
        bindings: Arc::new(PostgresPlanBindingRepository::new(pool.clone())),
        subscriptions: Arc::new(PostgresSubscriptionRepository::new(pool.clone())),
        settlements: Arc::new(PostgresSettlementStore::new(pool.clone())),
        plan_cache,
        gateway: Arc::new(gateway),
        notifier: Arc::new(TracingNotifier::new()),
    };
    let policy = HttpPolicy {
        default_callback_url: config.payment.default_callback_url.clone(),
        acknowledge_invalid_signatures: config.payment.acknowledge_invalid_signatures,
        admin_token: config.server.admin_token.clone(),
    };
    let state = BillingAppState::new(
        ports,
        config.payment.webhook_key(),
        config.sweeper.batch_size,
        policy,
    );

    if let Some(interval) = config.sweeper.interval() {
        tokio::spawn(run_sweeper(state.sweeper.clone(), interval));
    }

    let app = billing_router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                    .on_response(DefaultOnResponse::new().level(Level::INFO)),
            )
            .layer(cors_layer(&config.server))
            .layer(TimeoutLayer::new(config.server.request_timeout())),
    );

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(server: &ServerConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&server.log_level));
    let registry = tracing_subscriber::registry().with(filter);

    if server.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().pretty()).init();
    }
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<_> = server
        .cors_origins_list()
        .iter()
        .filter_map(|o| o.parse::<http::HeaderValue>().ok())
        .collect();

    if origins.is_empty() {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

/// Runs the expiry sweep forever. The sweep logs its own summary; a failed
/// candidate query is retried on the next tick.
async fn run_sweeper(sweeper: Arc<SweepExpiredHandler>, interval: std::time::Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = sweeper.handle().await {
            tracing::error!(error = %e, "Expiry sweep failed");
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
