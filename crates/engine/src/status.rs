//! Order status state machine.
//!
//! The transition graph is the single source of truth for which status
//! changes are legal. A successful transition is the canonical trigger
//! event consumed by the scheduler; an illegal one is rejected with a
//! validation error and has no side effects.

use apteka_common::error::AppError;
use apteka_common::types::OrderStatus;

/// A successful order status transition, handed to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: i64,
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Whether `from → to` is a legal transition.
///
/// Forward path: unpaid → paid → processing → shipped → delivered.
/// Any non-terminal state may be cancelled; refunds are possible once
/// money has moved (paid and later). Unpaid orders time out to overdue,
/// and an overdue order can still be paid or cancelled.
pub fn is_legal(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (Unpaid, Paid)
            | (Unpaid, Overdue)
            | (Unpaid, Cancelled)
            | (Overdue, Paid)
            | (Overdue, Cancelled)
            | (Paid, Processing)
            | (Paid, Cancelled)
            | (Paid, Refunded)
            | (Processing, Shipped)
            | (Processing, Cancelled)
            | (Processing, Refunded)
            | (Shipped, Delivered)
            | (Shipped, Refunded)
            | (Delivered, Refunded)
    )
}

/// Validate a transition, returning the change record on success.
pub fn transition(
    order_id: i64,
    from: OrderStatus,
    to: OrderStatus,
) -> Result<StatusChange, AppError> {
    if !is_legal(from, to) {
        return Err(AppError::InvalidTransition(format!(
            "Order {} cannot move {} -> {}",
            order_id, from, to
        )));
    }
    Ok(StatusChange { order_id, from, to })
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_forward_path_is_legal() {
        for (from, to) in [
            (Unpaid, Paid),
            (Paid, Processing),
            (Processing, Shipped),
            (Shipped, Delivered),
        ] {
            assert!(is_legal(from, to), "{} -> {} should be legal", from, to);
        }
    }

    #[test]
    fn test_unpaid_times_out_and_recovers() {
        assert!(is_legal(Unpaid, Overdue));
        assert!(is_legal(Overdue, Paid));
        assert!(is_legal(Overdue, Cancelled));
    }

    #[test]
    fn test_skipping_states_is_rejected() {
        assert!(!is_legal(Unpaid, Shipped));
        assert!(!is_legal(Unpaid, Delivered));
        assert!(!is_legal(Paid, Delivered));
    }

    #[test]
    fn test_terminal_states_have_no_forward_exits() {
        for terminal in [Cancelled, Refunded] {
            for to in [Unpaid, Paid, Processing, Shipped, Delivered, Overdue] {
                assert!(!is_legal(terminal, to), "{} must be terminal", terminal);
            }
        }
    }

    #[test]
    fn test_refund_requires_payment() {
        assert!(!is_legal(Unpaid, Refunded));
        assert!(!is_legal(Overdue, Refunded));
        assert!(is_legal(Paid, Refunded));
        assert!(is_legal(Delivered, Refunded));
    }

    #[test]
    fn test_transition_rejects_illegal_with_no_change() {
        let err = transition(9, Delivered, Paid).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition(_)));

        let change = transition(9, Unpaid, Paid).unwrap();
        assert_eq!(
            change,
            StatusChange {
                order_id: 9,
                from: Unpaid,
                to: Paid
            }
        );
    }
}
