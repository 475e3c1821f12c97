//! Shared application state for the Axum API server.

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use apteka_common::config::AppConfig;
use apteka_engine::scheduler::NotificationScheduler;
use apteka_queue::store::JobStore;
use apteka_worker::delivery::WorkerHandle;

/// Application state shared across all route handlers via Axum `State`.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub redis: ConnectionManager,
    pub config: AppConfig,
    pub store: JobStore,
    pub scheduler: NotificationScheduler,
    pub worker: WorkerHandle,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        redis: ConnectionManager,
        config: AppConfig,
        worker: WorkerHandle,
    ) -> Self {
        let store = JobStore::new(pool.clone());
        let scheduler =
            NotificationScheduler::new(store.clone(), pool.clone(), config.admin_chat_id);
        Self {
            pool,
            redis,
            config,
            store,
            scheduler,
            worker,
        }
    }
}
