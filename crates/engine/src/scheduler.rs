//! Notification scheduling policy.
//!
//! Translates domain events (order created, order status changed, stock
//! replenished, loyalty tier changed) into queue jobs, and retracts
//! previously scheduled jobs when the triggering condition no longer
//! holds. Stateless per call: the only I/O is the job store plus the
//! read-only subscription lookup for restock fan-out.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use apteka_common::error::AppError;
use apteka_common::types::{NotificationPayload, OrderSnapshot, OrderStatus};
use apteka_queue::store::JobStore;
use apteka_queue::{QUEUE_NOTICES, QUEUE_REMINDERS};

use crate::status::StatusChange;
use crate::subscription;

/// Offsets from order creation, in hours, at which payment reminders fire.
const REMINDER_OFFSET_HOURS: &[i64] = &[2, 24];

/// Maximum per-subscriber jitter for restock fan-out, in seconds.
/// Spreads a large fan-out so deliveries don't land as one burst.
const RESTOCK_JITTER_SECS: i64 = 30;

/// Correlation key tying all payment reminders to one order.
fn payment_correlation_key(order_id: i64) -> String {
    format!("order:{}:payment", order_id)
}

/// Scheduling policy layer between domain events and the job store.
#[derive(Clone)]
pub struct NotificationScheduler {
    store: JobStore,
    pool: PgPool,
    admin_chat_id: i64,
}

impl NotificationScheduler {
    pub fn new(store: JobStore, pool: PgPool, admin_chat_id: i64) -> Self {
        Self {
            store,
            pool,
            admin_chat_id,
        }
    }

    pub fn store(&self) -> &JobStore {
        &self.store
    }

    /// Enqueue one payment reminder per configured offset, all tied to the
    /// order via its correlation key so a payment retracts them in bulk.
    pub async fn schedule_payment_reminder(
        &self,
        order: &OrderSnapshot,
    ) -> Result<Vec<Uuid>, AppError> {
        let key = payment_correlation_key(order.order_id);
        let now = Utc::now();
        let mut job_ids = Vec::with_capacity(REMINDER_OFFSET_HOURS.len());

        for hours in REMINDER_OFFSET_HOURS {
            let payload = NotificationPayload::PaymentReminder {
                order_id: order.order_id,
                user_id: order.user_id,
                chat_id: order.chat_id,
                total_amount: order.total_amount.clone(),
                currency: order.currency.clone(),
            };
            let id = self
                .store
                .enqueue(QUEUE_REMINDERS, &payload, now + Duration::hours(*hours), Some(&key))
                .await?;
            job_ids.push(id);
        }

        tracing::info!(
            order_id = order.order_id,
            reminders = job_ids.len(),
            "Payment reminders scheduled"
        );
        Ok(job_ids)
    }

    /// Retract every pending payment reminder for an order. Reminders
    /// already claimed by the worker are allowed to complete.
    pub async fn cancel_payment_reminders(&self, order_id: i64) -> Result<u64, AppError> {
        self.store
            .cancel_by_correlation(QUEUE_REMINDERS, &payment_correlation_key(order_id))
            .await
    }

    /// Notify a user about loyalty bonus credited for an order.
    pub async fn schedule_bonus_notification(
        &self,
        user_id: i64,
        chat_id: i64,
        bonus_amount: &str,
        order_id: i64,
    ) -> Result<Uuid, AppError> {
        let payload = NotificationPayload::BonusNotice {
            order_id,
            user_id,
            chat_id,
            bonus_amount: bonus_amount.to_string(),
        };
        self.store
            .enqueue(QUEUE_NOTICES, &payload, Utc::now(), None)
            .await
    }

    /// Fan out one restock notice per subscriber of a product.
    ///
    /// Zero subscribers is a no-op, not an error. Duplicate triggers are
    /// the caller's problem: this method is stateless and will happily fan
    /// out again if the stock event fires twice.
    pub async fn schedule_restock_notification(&self, product_id: i64) -> Result<u64, AppError> {
        let subscribers = subscription::find_restock_subscribers(&self.pool, product_id).await?;
        if subscribers.is_empty() {
            tracing::debug!(product_id, "Restock event with no subscribers, skipping");
            return Ok(0);
        }

        let now = Utc::now();
        let mut scheduled = 0u64;
        for sub in &subscribers {
            let jitter = Duration::seconds(rand::thread_rng().gen_range(0..=RESTOCK_JITTER_SECS));
            let payload = NotificationPayload::RestockNotice {
                product_id,
                user_id: sub.user_id,
                chat_id: sub.chat_id,
                product_name: sub.product_name.clone(),
            };
            self.store
                .enqueue(QUEUE_NOTICES, &payload, now + jitter, None)
                .await?;
            scheduled += 1;
        }

        tracing::info!(product_id, scheduled, "Restock notices scheduled");
        Ok(scheduled)
    }

    /// Notify a user that their loyalty tier changed.
    pub async fn schedule_account_tier_notification(
        &self,
        user_id: i64,
        chat_id: i64,
        tier_name: &str,
        bonus_percentage: &str,
    ) -> Result<Uuid, AppError> {
        let payload = NotificationPayload::AccountTierNotice {
            user_id,
            chat_id,
            tier_name: tier_name.to_string(),
            bonus_percentage: bonus_percentage.to_string(),
        };
        self.store
            .enqueue(QUEUE_NOTICES, &payload, Utc::now(), None)
            .await
    }

    /// Map a successful order status transition to its notification actions.
    ///
    /// The mapping is deterministic per `(from, to)` pair:
    /// - `unpaid/overdue → paid`: retract reminders, notify the admin chat
    /// - `unpaid/overdue → cancelled`: retract reminders
    /// - `unpaid → overdue`: retract reminders, tell the customer
    /// - `→ shipped`: tell the customer, with tracking number if present
    /// - `→ refunded`: tell the customer
    ///
    /// Other legal transitions produce no notifications.
    pub async fn on_order_status_changed(
        &self,
        change: StatusChange,
        order: &OrderSnapshot,
    ) -> Result<(), AppError> {
        use OrderStatus::*;

        match (change.from, change.to) {
            (Unpaid | Overdue, Paid) => {
                let cancelled = self.cancel_payment_reminders(change.order_id).await?;
                tracing::info!(
                    order_id = change.order_id,
                    cancelled,
                    "Order paid, reminders retracted"
                );
                self.enqueue_status_notice(order, Paid, self.admin_chat_id)
                    .await?;
            }
            (Unpaid | Overdue, Cancelled) => {
                self.cancel_payment_reminders(change.order_id).await?;
            }
            (Unpaid, Overdue) => {
                self.cancel_payment_reminders(change.order_id).await?;
                self.enqueue_status_notice(order, Overdue, order.chat_id)
                    .await?;
            }
            (_, Shipped) => {
                self.enqueue_status_notice(order, Shipped, order.chat_id)
                    .await?;
            }
            (_, Refunded) => {
                self.enqueue_status_notice(order, Refunded, order.chat_id)
                    .await?;
            }
            _ => {}
        }

        Ok(())
    }

    async fn enqueue_status_notice(
        &self,
        order: &OrderSnapshot,
        status: OrderStatus,
        chat_id: i64,
    ) -> Result<Uuid, AppError> {
        let payload = NotificationPayload::OrderStatusNotice {
            order_id: order.order_id,
            chat_id,
            status,
            tracking_number: order.tracking_number.clone(),
        };
        self.store
            .enqueue(QUEUE_NOTICES, &payload, Utc::now(), None)
            .await
    }

    /// Sweep unpaid orders whose payment deadline has passed to `overdue`,
    /// running each through the state machine and notification mapping.
    ///
    /// Returns the number of orders transitioned.
    pub async fn mark_overdue_orders(&self, deadline: DateTime<Utc>) -> Result<u64, AppError> {
        let snapshots: Vec<OrderSnapshot> = sqlx::query_as(
            r#"
            SELECT o.id AS order_id, o.user_id, u.chat_id,
                   o.total_amount::text AS total_amount, o.currency, o.tracking_number
            FROM orders o
            JOIN users u ON u.id = o.user_id
            WHERE o.status = 'unpaid' AND o.created_at < $1
            "#,
        )
        .bind(deadline)
        .fetch_all(&self.pool)
        .await?;

        let mut swept = 0u64;
        for order in &snapshots {
            let change =
                crate::status::transition(order.order_id, OrderStatus::Unpaid, OrderStatus::Overdue)?;

            let updated = sqlx::query(
                "UPDATE orders SET status = 'overdue' WHERE id = $1 AND status = 'unpaid'",
            )
            .bind(order.order_id)
            .execute(&self.pool)
            .await?;

            // Lost a race with a concurrent payment: skip, no notice.
            if updated.rows_affected() == 0 {
                continue;
            }

            self.on_order_status_changed(change, order).await?;
            swept += 1;
        }

        if swept > 0 {
            tracing::info!(swept, "Unpaid orders swept to overdue");
        }
        Ok(swept)
    }
}
