//! Messaging gateway abstraction and its Telegram implementation.
//!
//! The worker only sees the `MessagingGateway` trait; errors are split
//! into transient (retry with backoff) and permanent (fail the job now)
//! based on how the provider answered.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::render::OutboundMessage;

/// Delivery failure classification.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Retryable: network failure, timeout, rate limit, provider 5xx.
    #[error("Transient delivery error: {0}")]
    Transient(String),

    /// Not retryable: invalid recipient, blocked bot, malformed request.
    #[error("Permanent delivery error: {0}")]
    Permanent(String),
}

/// Outbound messaging provider.
pub trait MessagingGateway: Send + Sync + 'static {
    /// Send a message; returns the provider's message ID.
    fn send(
        &self,
        message: &OutboundMessage,
    ) -> impl Future<Output = Result<i64, DeliveryError>> + Send;

    /// Probe the provider during worker initialization.
    fn health_check(&self) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}

/// Telegram Bot API gateway.
pub struct TelegramGateway {
    client: reqwest::Client,
    api_base: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<serde_json::Value>,
}

impl TelegramGateway {
    pub fn new(bot_token: &str, timeout: Duration) -> anyhow::Result<Self> {
        // The explicit request timeout keeps a stuck send from blocking
        // subsequent worker ticks.
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: format!("https://api.telegram.org/bot{}", bot_token),
        })
    }

    /// Override the API base URL. Used by tests to point at a local stub.
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn classify_status(status: reqwest::StatusCode, body: &str) -> DeliveryError {
        if status.as_u16() == 429 || status.is_server_error() {
            DeliveryError::Transient(format!("Telegram {}: {}", status, body))
        } else {
            // 400 bad chat, 403 bot blocked by user, etc.
            DeliveryError::Permanent(format!("Telegram {}: {}", status, body))
        }
    }
}

impl MessagingGateway for TelegramGateway {
    async fn send(&self, message: &OutboundMessage) -> Result<i64, DeliveryError> {
        let reply_markup = message.buttons.as_ref().map(|rows| {
            serde_json::json!({
                "inline_keyboard": rows
                    .iter()
                    .map(|row| {
                        row.iter()
                            .map(|b| serde_json::json!({
                                "text": b.text,
                                "callback_data": b.callback_data,
                            }))
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
        });

        let request = SendMessageRequest {
            chat_id: message.chat_id,
            text: &message.text,
            reply_markup,
        };

        let response = self
            .client
            .post(format!("{}/sendMessage", self.api_base))
            .json(&request)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(format!("Invalid response body: {}", e)))?;

        body.get("result")
            .and_then(|r| r.get("message_id"))
            .and_then(|id| id.as_i64())
            .ok_or_else(|| {
                DeliveryError::Permanent(format!("Unexpected Telegram response: {}", body))
            })
    }

    async fn health_check(&self) -> Result<(), DeliveryError> {
        let response = self
            .client
            .get(format!("{}/getMe", self.api_base))
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_status(status, &body));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_rate_limit_and_server_errors_are_transient() {
        for status in [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::BAD_GATEWAY,
        ] {
            let err = TelegramGateway::classify_status(status, "");
            assert!(matches!(err, DeliveryError::Transient(_)), "{}", status);
        }
    }

    #[test]
    fn test_client_errors_are_permanent() {
        for status in [StatusCode::BAD_REQUEST, StatusCode::FORBIDDEN] {
            let err = TelegramGateway::classify_status(status, "bot was blocked");
            assert!(matches!(err, DeliveryError::Permanent(_)), "{}", status);
        }
    }
}
