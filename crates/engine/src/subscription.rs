//! Read-only access to product restock subscriptions.
//!
//! Subscription rows are created and deleted by the storefront's
//! user-facing feature; the notification engine only reads them when a
//! product comes back in stock.

use sqlx::PgPool;

use apteka_common::error::AppError;
use apteka_common::types::RestockSubscriber;

/// Find every subscriber of a product, joined with the chat the restock
/// notice should be delivered to.
pub async fn find_restock_subscribers(
    pool: &PgPool,
    product_id: i64,
) -> Result<Vec<RestockSubscriber>, AppError> {
    let subscribers: Vec<RestockSubscriber> = sqlx::query_as(
        r#"
        SELECT s.user_id, u.chat_id, p.name AS product_name
        FROM product_subscriptions s
        JOIN users u ON u.id = s.user_id
        JOIN products p ON p.id = s.product_id
        WHERE s.product_id = $1
        "#,
    )
    .bind(product_id)
    .fetch_all(pool)
    .await?;

    Ok(subscribers)
}
