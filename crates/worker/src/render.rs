//! Message rendering.
//!
//! Payloads already carry every human-readable field, so rendering is
//! direct interpolation — no template engine, no database reads.

use apteka_common::types::{NotificationPayload, OrderStatus};

/// A single inline keyboard button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

/// A rendered message ready for the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub chat_id: i64,
    pub text: String,
    /// Inline keyboard rows, when the message carries actions.
    pub buttons: Option<Vec<Vec<InlineButton>>>,
}

/// Render a typed payload into an outbound message.
pub fn render(payload: &NotificationPayload) -> OutboundMessage {
    match payload {
        NotificationPayload::PaymentReminder {
            order_id,
            chat_id,
            total_amount,
            currency,
            ..
        } => OutboundMessage {
            chat_id: *chat_id,
            text: format!(
                "Your order #{} is awaiting payment: {} {}.\n\
                 Unpaid orders are cancelled automatically.",
                order_id, total_amount, currency
            ),
            buttons: Some(vec![vec![
                InlineButton {
                    text: "✅ I paid".to_string(),
                    callback_data: format!("order_paid:{}", order_id),
                },
                InlineButton {
                    text: "Cancel order".to_string(),
                    callback_data: format!("order_cancel:{}", order_id),
                },
            ]]),
        },
        NotificationPayload::BonusNotice {
            order_id,
            chat_id,
            bonus_amount,
            ..
        } => OutboundMessage {
            chat_id: *chat_id,
            text: format!(
                "You earned a bonus of {} for order #{}. It will be applied to your next purchase.",
                bonus_amount, order_id
            ),
            buttons: None,
        },
        NotificationPayload::RestockNotice {
            chat_id,
            product_name,
            ..
        } => OutboundMessage {
            chat_id: *chat_id,
            text: format!("{} is back in stock. Order now while it lasts.", product_name),
            buttons: None,
        },
        NotificationPayload::AccountTierNotice {
            chat_id,
            tier_name,
            bonus_percentage,
            ..
        } => OutboundMessage {
            chat_id: *chat_id,
            text: format!(
                "Your account was upgraded to {}. You now earn {}% bonus on every order.",
                tier_name, bonus_percentage
            ),
            buttons: None,
        },
        NotificationPayload::OrderStatusNotice {
            order_id,
            chat_id,
            status,
            tracking_number,
        } => {
            let text = match status {
                OrderStatus::Paid => format!("Order #{} has been paid.", order_id),
                OrderStatus::Shipped => match tracking_number {
                    Some(tracking) => format!(
                        "Order #{} has shipped. Tracking number: {}.",
                        order_id, tracking
                    ),
                    None => format!("Order #{} has shipped.", order_id),
                },
                OrderStatus::Overdue => format!(
                    "Payment for order #{} is overdue. The order will be cancelled soon.",
                    order_id
                ),
                OrderStatus::Refunded => format!("Order #{} has been refunded.", order_id),
                other => format!("Order #{} is now {}.", order_id, other),
            };
            OutboundMessage {
                chat_id: *chat_id,
                text,
                buttons: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_reminder_has_paid_and_cancel_buttons() {
        let message = render(&NotificationPayload::PaymentReminder {
            order_id: 42,
            user_id: 7,
            chat_id: 1007,
            total_amount: "19.90".to_string(),
            currency: "EUR".to_string(),
        });

        assert_eq!(message.chat_id, 1007);
        assert!(message.text.contains("#42"));
        assert!(message.text.contains("19.90 EUR"));

        let rows = message.buttons.unwrap();
        assert_eq!(rows[0][0].callback_data, "order_paid:42");
        assert_eq!(rows[0][1].callback_data, "order_cancel:42");
    }

    #[test]
    fn test_restock_notice_names_the_product() {
        let message = render(&NotificationPayload::RestockNotice {
            product_id: 7,
            user_id: 1,
            chat_id: 1001,
            product_name: "Ibuprofen 400mg".to_string(),
        });
        assert!(message.text.contains("Ibuprofen 400mg"));
        assert!(message.buttons.is_none());
    }

    #[test]
    fn test_shipped_notice_includes_tracking_when_present() {
        let with_tracking = render(&NotificationPayload::OrderStatusNotice {
            order_id: 60,
            chat_id: 1007,
            status: OrderStatus::Shipped,
            tracking_number: Some("TRK-00142".to_string()),
        });
        assert!(with_tracking.text.contains("TRK-00142"));

        let without = render(&NotificationPayload::OrderStatusNotice {
            order_id: 60,
            chat_id: 1007,
            status: OrderStatus::Shipped,
            tracking_number: None,
        });
        assert!(!without.text.contains("Tracking"));
    }

    #[test]
    fn test_tier_notice_mentions_percentage() {
        let message = render(&NotificationPayload::AccountTierNotice {
            user_id: 7,
            chat_id: 1007,
            tier_name: "Gold".to_string(),
            bonus_percentage: "5".to_string(),
        });
        assert!(message.text.contains("Gold"));
        assert!(message.text.contains("5%"));
    }
}
