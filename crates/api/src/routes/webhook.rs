//! Webhook ingress for provider callbacks.
//!
//! Pipeline: authenticate (HMAC over the raw body) → parse → deduplicate
//! by `update_id` → route by payload shape. The provider delivers
//! at-least-once; dedup makes replays acknowledge without re-processing.
//! Once a request is authenticated and parsed it is always acked with
//! `200 {"ok": true}` — handler failures are logged, never surfaced, so
//! the provider does not enter a redelivery loop.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;

use apteka_common::error::AppError;
use apteka_common::types::{OrderSnapshot, OrderStatus};
use apteka_engine::status;

use crate::middleware::signature;
use crate::state::AppState;

/// How long a seen `update_id` blocks replays, in seconds.
const DEDUP_TTL_SECS: u64 = 24 * 60 * 60;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(handle_webhook))
}

/// Provider push envelope. Exactly one of the optional fields is set per
/// update; anything else is an update shape this engine ignores.
#[derive(Debug, Deserialize)]
struct UpdateEnvelope {
    update_id: i64,
    message: Option<IncomingMessage>,
    callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    message_id: Option<i64>,
    chat: ChatRef,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatRef {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    data: Option<String>,
}

/// The routed form of an inbound update.
#[derive(Debug)]
enum InboundUpdate {
    Message(IncomingMessage),
    Callback(CallbackQuery),
}

impl UpdateEnvelope {
    fn classify(self) -> Option<InboundUpdate> {
        if let Some(callback) = self.callback_query {
            return Some(InboundUpdate::Callback(callback));
        }
        if let Some(message) = self.message {
            return Some(InboundUpdate::Message(message));
        }
        None
    }
}

/// Actions encoded in callback button data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallbackAction {
    OrderPaid(i64),
    OrderCancel(i64),
}

impl CallbackAction {
    fn parse(data: &str) -> Option<Self> {
        let (tag, id) = data.split_once(':')?;
        let id: i64 = id.parse().ok()?;
        match tag {
            "order_paid" => Some(CallbackAction::OrderPaid(id)),
            "order_cancel" => Some(CallbackAction::OrderCancel(id)),
            _ => None,
        }
    }
}

/// POST /webhook — authenticated, deduplicated provider callback ingress.
async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let signature_header = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    signature::verify(state.config.webhook_secret.as_deref(), signature_header, &body)?;

    let envelope: UpdateEnvelope = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Malformed webhook body: {}", e)))?;
    let update_id = envelope.update_id;

    // At-least-once delivery upstream; behave as exactly-once downstream.
    if !mark_update_seen(&state, update_id).await? {
        tracing::debug!(update_id, "Duplicate update acknowledged without processing");
        return Ok(Json(serde_json::json!({ "ok": true })));
    }

    // From here on the provider always gets a success ack.
    if let Some(update) = envelope.classify() {
        if let Err(e) = process_update(&state, update).await {
            tracing::error!(update_id, error = %e, "Webhook processing failed");
        }
    } else {
        tracing::debug!(update_id, "Ignoring update with unhandled shape");
    }

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Record an update ID in Redis. Returns `true` when this is the first
/// sighting. `SET NX EX` is atomic and survives process restarts.
async fn mark_update_seen(state: &AppState, update_id: i64) -> Result<bool, AppError> {
    let key = format!("webhook:update:{}", update_id);
    let mut redis = state.redis.clone();

    let result: Option<String> = redis::cmd("SET")
        .arg(&key)
        .arg("1")
        .arg("NX")
        .arg("EX")
        .arg(DEDUP_TTL_SECS)
        .query_async(&mut redis)
        .await?;

    Ok(result.is_some())
}

async fn process_update(state: &AppState, update: InboundUpdate) -> Result<(), AppError> {
    match update {
        InboundUpdate::Message(message) => persist_chat_message(state, &message).await,
        InboundUpdate::Callback(callback) => {
            let Some(data) = callback.data.as_deref() else {
                return Ok(());
            };
            let Some(action) = CallbackAction::parse(data) else {
                tracing::debug!(data, "Unknown callback action, ignoring");
                return Ok(());
            };
            match action {
                CallbackAction::OrderPaid(order_id) => {
                    apply_order_transition(state, order_id, OrderStatus::Paid).await
                }
                CallbackAction::OrderCancel(order_id) => {
                    apply_order_transition(state, order_id, OrderStatus::Cancelled).await
                }
            }
        }
    }
}

/// Plain messages feed the chat-history feature; the notification engine
/// otherwise ignores them.
async fn persist_chat_message(
    state: &AppState,
    message: &IncomingMessage,
) -> Result<(), AppError> {
    sqlx::query("INSERT INTO chat_messages (chat_id, message_id, text) VALUES ($1, $2, $3)")
        .bind(message.chat.id)
        .bind(message.message_id)
        .bind(&message.text)
        .execute(&state.pool)
        .await?;
    Ok(())
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    order_id: i64,
    user_id: i64,
    chat_id: i64,
    total_amount: String,
    currency: String,
    tracking_number: Option<String>,
    status: OrderStatus,
}

/// Run a button-triggered order status transition through the state
/// machine, persist it with a compare-and-set, and hand the change to the
/// scheduler.
async fn apply_order_transition(
    state: &AppState,
    order_id: i64,
    to: OrderStatus,
) -> Result<(), AppError> {
    let row: OrderRow = sqlx::query_as(
        r#"
        SELECT o.id AS order_id, o.user_id, u.chat_id,
               o.total_amount::text AS total_amount, o.currency, o.tracking_number, o.status
        FROM orders o
        JOIN users u ON u.id = o.user_id
        WHERE o.id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found", order_id)))?;

    let change = status::transition(order_id, row.status, to)?;

    // CAS on the previous status: a concurrent transition wins the race
    // and this one becomes a no-op.
    let updated = sqlx::query("UPDATE orders SET status = $1 WHERE id = $2 AND status = $3")
        .bind(to)
        .bind(order_id)
        .bind(row.status)
        .execute(&state.pool)
        .await?;

    if updated.rows_affected() == 0 {
        tracing::warn!(order_id, from = %row.status, to = %to, "Lost transition race, skipping");
        return Ok(());
    }

    tracing::info!(order_id, from = %row.status, to = %to, "Order status changed via webhook");

    let snapshot = OrderSnapshot {
        order_id: row.order_id,
        user_id: row.user_id,
        chat_id: row.chat_id,
        total_amount: row.total_amount,
        currency: row.currency,
        tracking_number: row.tracking_number,
    };
    state.scheduler.on_order_status_changed(change, &snapshot).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_action_parsing() {
        assert_eq!(
            CallbackAction::parse("order_paid:42"),
            Some(CallbackAction::OrderPaid(42))
        );
        assert_eq!(
            CallbackAction::parse("order_cancel:7"),
            Some(CallbackAction::OrderCancel(7))
        );
        assert_eq!(CallbackAction::parse("order_paid:abc"), None);
        assert_eq!(CallbackAction::parse("unknown:1"), None);
        assert_eq!(CallbackAction::parse("no_separator"), None);
    }

    #[test]
    fn test_envelope_classification_prefers_callback() {
        let envelope: UpdateEnvelope = serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "callback_query": { "data": "order_paid:42" }
        }))
        .unwrap();
        assert!(matches!(
            envelope.classify(),
            Some(InboundUpdate::Callback(_))
        ));

        let envelope: UpdateEnvelope = serde_json::from_value(serde_json::json!({
            "update_id": 2,
            "message": { "chat": { "id": 1007 }, "text": "hello" }
        }))
        .unwrap();
        assert!(matches!(
            envelope.classify(),
            Some(InboundUpdate::Message(_))
        ));

        let envelope: UpdateEnvelope =
            serde_json::from_value(serde_json::json!({ "update_id": 3 })).unwrap();
        assert!(envelope.classify().is_none());
    }
}
