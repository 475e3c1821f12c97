//! Apteka API server binary entrypoint.
//!
//! One process hosts both the webhook ingress and the delivery worker;
//! they share nothing but the job store.

use std::net::SocketAddr;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use apteka_common::config::AppConfig;
use apteka_common::db::create_pool;
use apteka_common::redis_pool::create_redis_pool;
use apteka_engine::scheduler::NotificationScheduler;
use apteka_queue::store::JobStore;
use apteka_worker::delivery::{DeliveryWorker, WorkerConfig};
use apteka_worker::gateway::TelegramGateway;

use apteka_api::routes::create_router;
use apteka_api::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("apteka_api=debug,apteka_engine=debug,apteka_worker=debug,tower_http=debug")
        }))
        .init();

    tracing::info!("Starting Apteka API server...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Create database connection pool and run migrations
    let pool = create_pool(&config).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database pool created, migrations applied");

    // Create Redis connection
    let redis = create_redis_pool(&config.redis_url).await?;

    // Build the delivery worker and take its control handle before it moves
    // into its own task.
    let gateway = TelegramGateway::new(
        &config.telegram_bot_token,
        Duration::from_secs(config.gateway_timeout_secs),
    )?;
    let mut worker = DeliveryWorker::new(
        JobStore::new(pool.clone()),
        gateway,
        WorkerConfig {
            poll_interval: Duration::from_millis(config.worker_poll_interval_ms),
            batch_size: config.worker_batch_size,
            send_concurrency: config.worker_send_concurrency as usize,
        },
    );
    worker.initialize().await?;
    let worker_handle = worker.handle();
    tokio::spawn(worker.run());

    // Hourly sweep of unpaid orders past their payment deadline.
    let sweep_scheduler = NotificationScheduler::new(
        JobStore::new(pool.clone()),
        pool.clone(),
        config.admin_chat_id,
    );
    let overdue_hours = config.payment_overdue_hours;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        loop {
            interval.tick().await;
            let deadline = chrono::Utc::now() - chrono::Duration::hours(overdue_hours);
            if let Err(e) = sweep_scheduler.mark_overdue_orders(deadline).await {
                tracing::error!(error = %e, "Overdue sweep failed");
            }
        }
    });

    // Build application state
    let state = AppState::new(pool, redis, config, worker_handle);

    // Build router
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], 3000));
    tracing::info!("API server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
