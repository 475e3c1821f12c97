use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;

/// Open the shared PostgreSQL pool, sized and timed out per `AppConfig`.
///
/// The acquire timeout bounds how long a webhook handler can stall behind
/// worker ticks when the pool is saturated.
pub async fn create_pool(config: &AppConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.db_acquire_timeout_secs))
        .connect(&config.database_url)
        .await?;

    tracing::info!(
        max_connections = config.db_max_connections,
        acquire_timeout_secs = config.db_acquire_timeout_secs,
        "PostgreSQL pool ready"
    );
    Ok(pool)
}
