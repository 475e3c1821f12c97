use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order lifecycle states.
///
/// Legal transitions between these form a directed graph owned by
/// `apteka-engine::status`; the enum itself is just the closed state set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Unpaid,
    Paid,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
    Overdue,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Unpaid => write!(f, "unpaid"),
            OrderStatus::Paid => write!(f, "paid"),
            OrderStatus::Processing => write!(f, "processing"),
            OrderStatus::Shipped => write!(f, "shipped"),
            OrderStatus::Delivered => write!(f, "delivered"),
            OrderStatus::Cancelled => write!(f, "cancelled"),
            OrderStatus::Refunded => write!(f, "refunded"),
            OrderStatus::Overdue => write!(f, "overdue"),
        }
    }
}

/// Lifecycle of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Claimed,
    Done,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Claimed => write!(f, "claimed"),
            JobStatus::Done => write!(f, "done"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Typed job payloads, one variant per notification kind.
///
/// Each variant carries every human-readable field needed to render the
/// outbound message, so delivery never re-queries the catalog or order
/// tables at send time. Persisted as JSONB with a `kind` tag; the tag set
/// is the at-rest contract and must stay backward compatible — in-flight
/// jobs may be read by a newer worker than wrote them, so only additive
/// changes are allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationPayload {
    PaymentReminder {
        order_id: i64,
        user_id: i64,
        chat_id: i64,
        total_amount: String,
        currency: String,
    },
    BonusNotice {
        order_id: i64,
        user_id: i64,
        chat_id: i64,
        bonus_amount: String,
    },
    RestockNotice {
        product_id: i64,
        user_id: i64,
        chat_id: i64,
        product_name: String,
    },
    AccountTierNotice {
        user_id: i64,
        chat_id: i64,
        tier_name: String,
        bonus_percentage: String,
    },
    /// Transition-driven notice (order paid, shipped, overdue, refunded),
    /// addressed either to the customer or to the admin chat.
    OrderStatusNotice {
        order_id: i64,
        chat_id: i64,
        status: OrderStatus,
        tracking_number: Option<String>,
    },
}

impl NotificationPayload {
    /// The chat the rendered message is addressed to.
    pub fn chat_id(&self) -> i64 {
        match self {
            NotificationPayload::PaymentReminder { chat_id, .. } => *chat_id,
            NotificationPayload::BonusNotice { chat_id, .. } => *chat_id,
            NotificationPayload::RestockNotice { chat_id, .. } => *chat_id,
            NotificationPayload::AccountTierNotice { chat_id, .. } => *chat_id,
            NotificationPayload::OrderStatusNotice { chat_id, .. } => *chat_id,
        }
    }
}

/// A unit of deferred work in a named queue.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub queue_name: String,
    pub payload: serde_json::Value,
    pub ready_at: DateTime<Utc>,
    pub correlation_key: Option<String>,
    pub attempts: i32,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Decode the JSONB payload into its typed form.
    pub fn typed_payload(&self) -> Result<NotificationPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Queue introspection snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub pending_count: i64,
    pub oldest_ready_at: Option<DateTime<Utc>>,
}

/// Denormalized order fields handed to the scheduler on a status change.
///
/// The scheduler never reads the orders table itself; whoever performs the
/// transition supplies the snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderSnapshot {
    pub order_id: i64,
    pub user_id: i64,
    pub chat_id: i64,
    pub total_amount: String,
    pub currency: String,
    pub tracking_number: Option<String>,
}

/// A user subscribed to a product's restock notice, joined with the chat
/// the notice should be delivered to.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RestockSubscriber {
    pub user_id: i64,
    pub chat_id: i64,
    pub product_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trips_through_tagged_json() {
        let payload = NotificationPayload::PaymentReminder {
            order_id: 42,
            user_id: 7,
            chat_id: 1007,
            total_amount: "14.50".to_string(),
            currency: "EUR".to_string(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["kind"], "payment_reminder");
        assert_eq!(value["order_id"], 42);

        let back: NotificationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn test_payload_tolerates_unknown_fields() {
        // A newer writer may add fields; an older reader must still decode.
        let value = serde_json::json!({
            "kind": "bonus_notice",
            "order_id": 1,
            "user_id": 2,
            "chat_id": 3,
            "bonus_amount": "5.00",
            "added_in_v2": true
        });
        let payload: NotificationPayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.chat_id(), 3);
    }
}
