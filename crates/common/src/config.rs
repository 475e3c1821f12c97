use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string
    pub redis_url: String,

    /// Telegram bot token used by the delivery gateway
    pub telegram_bot_token: String,

    /// Shared secret for webhook signature verification.
    /// When unset, inbound webhooks are accepted without authentication
    /// (a warning is logged on every request).
    pub webhook_secret: Option<String>,

    /// Chat ID that receives admin-facing notices (payments, refunds)
    pub admin_chat_id: i64,

    /// Delivery worker poll interval in milliseconds (default: 3000)
    pub worker_poll_interval_ms: u64,

    /// Maximum jobs claimed per queue per tick (default: 20)
    pub worker_batch_size: u32,

    /// Maximum concurrent gateway sends within one tick (default: 5)
    pub worker_send_concurrency: u32,

    /// Gateway request timeout in seconds (default: 10)
    pub gateway_timeout_secs: u64,

    /// Hours before an unpaid order is swept to overdue (default: 48)
    pub payment_overdue_hours: i64,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Seconds to wait for a free pool connection before giving up (default: 5)
    pub db_acquire_timeout_secs: u64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| {
                anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required")
            })?,
            webhook_secret: std::env::var("WEBHOOK_SECRET").ok(),
            admin_chat_id: std::env::var("ADMIN_CHAT_ID")
                .map_err(|_| anyhow::anyhow!("ADMIN_CHAT_ID environment variable is required"))?
                .parse()
                .map_err(|_| anyhow::anyhow!("ADMIN_CHAT_ID must be a valid i64"))?,
            worker_poll_interval_ms: std::env::var("WORKER_POLL_INTERVAL_MS")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_POLL_INTERVAL_MS must be a valid u64"))?,
            worker_batch_size: std::env::var("WORKER_BATCH_SIZE")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_BATCH_SIZE must be a valid u32"))?,
            worker_send_concurrency: std::env::var("WORKER_SEND_CONCURRENCY")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("WORKER_SEND_CONCURRENCY must be a valid u32"))?,
            gateway_timeout_secs: std::env::var("GATEWAY_TIMEOUT_SECS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("GATEWAY_TIMEOUT_SECS must be a valid u64"))?,
            payment_overdue_hours: std::env::var("PAYMENT_OVERDUE_HOURS")
                .unwrap_or_else(|_| "48".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PAYMENT_OVERDUE_HOURS must be a valid i64"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            db_acquire_timeout_secs: std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_ACQUIRE_TIMEOUT_SECS must be a valid u64"))?,
        })
    }
}
