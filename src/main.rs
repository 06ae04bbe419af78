//! Recurring billing service entry point.

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;
use tracing_subscriber::EnvFilter;

use recurring_billing::adapters::gateway::build_gateway;
use recurring_billing::adapters::http::{billing_router, BillingAppState, RedirectTargets};
use recurring_billing::adapters::postgres::{
    PostgresBillingKeyStore, PostgresPaymentLedger, PostgresSubscriptionStore,
};
use recurring_billing::adapters::{SystemClock, TracingNotifier};
use recurring_billing::application::{
    ChargeSettings, ChargeSubscriptionHandler, ExpireLapsedSubscriptionsHandler,
    ReconcilePendingAttemptsHandler, RunBillingPassHandler,
};
use recurring_billing::config::AppConfig;
use recurring_billing::ports::{
    BillingKeyStore, Clock, GatewayClient, Notifier, PaymentLedger, SubscriptionStore,
};
use recurring_billing::scheduler::{BillingScheduler, TickSchedule};

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone()));

    if config.is_production() {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

fn startup_error(context: &str, e: impl std::fmt::Display) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, e))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = AppConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        startup_error("Configuration error", e)
    })?;
    init_tracing(&config);
    config
        .validate()
        .map_err(|e| startup_error("Invalid configuration", e))?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        gateway = ?config.gateway.protocol,
        cadence = ?config.scheduler.cadence,
        scheduler_enabled = config.scheduler.enabled,
        "Starting recurring-billing"
    );

    // Storage
    let pool = config
        .database
        .connect()
        .await
        .map_err(|e| startup_error("Database connection failed", e))?;
    if config.database.run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| startup_error("Migrations failed", e))?;
        tracing::info!("Database migrations applied");
    }
    let subscriptions: Arc<dyn SubscriptionStore> =
        Arc::new(PostgresSubscriptionStore::new(pool.clone()));
    let keys: Arc<dyn BillingKeyStore> = Arc::new(PostgresBillingKeyStore::new(pool.clone()));
    let ledger: Arc<dyn PaymentLedger> = Arc::new(PostgresPaymentLedger::new(pool));

    // Gateway and collaborators
    let gateway: Arc<dyn GatewayClient> = build_gateway(&config.gateway)
        .map_err(|e| startup_error("Gateway configuration error", e))?;
    let notifier: Arc<dyn Notifier> = Arc::new(TracingNotifier);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Scheduler
    let charge = Arc::new(ChargeSubscriptionHandler::new(
        subscriptions.clone(),
        keys.clone(),
        ledger.clone(),
        gateway.clone(),
        notifier.clone(),
        clock.clone(),
        ChargeSettings {
            period: config.scheduler.billing_period(),
            retry_policy: config.scheduler.retry_policy(),
            goods_name_prefix: config.gateway.goods_name_prefix.clone(),
        },
    ));
    let scheduler = Arc::new(BillingScheduler::new(
        Arc::new(RunBillingPassHandler::new(
            subscriptions.clone(),
            charge,
            clock.clone(),
            config.scheduler.charge_spacing(),
        )),
        Arc::new(ExpireLapsedSubscriptionsHandler::new(
            subscriptions.clone(),
            clock.clone(),
            config.scheduler.suspended_grace(),
        )),
        Arc::new(ReconcilePendingAttemptsHandler::new(
            ledger,
            gateway.clone(),
            clock.clone(),
            config.scheduler.reconcile_after(),
        )),
        clock.clone(),
        TickSchedule::from_config(&config.scheduler),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = if config.scheduler.enabled {
        let scheduler = scheduler.clone();
        Some(tokio::spawn(async move { scheduler.run(shutdown_rx).await }))
    } else {
        tracing::warn!("Billing scheduler disabled; charges run only via the admin endpoint");
        None
    };

    // HTTP
    let state = BillingAppState {
        subscriptions,
        keys,
        gateway,
        notifier,
        clock,
        scheduler,
        redirects: RedirectTargets {
            return_url: config.gateway.return_url.clone(),
            success_url: config.gateway.success_redirect_url.clone(),
            failure_url: config.gateway.failure_redirect_url.clone(),
        },
        admin_token: config.server.admin_token.clone(),
    };
    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(billing_router().with_state(state))
        .layer(TimeoutLayer::new(config.server.request_timeout()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        );

    let addr = config
        .server
        .socket_addr()
        .map_err(|e| startup_error("Invalid bind address", e))?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Billing scheduler task failed");
        }
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}
