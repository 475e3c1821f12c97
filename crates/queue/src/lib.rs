pub mod backoff;
pub mod store;

/// Queue holding time-offset payment reminders.
pub const QUEUE_REMINDERS: &str = "reminders";

/// Queue holding immediate notices (bonus, restock, account tier).
pub const QUEUE_NOTICES: &str = "notices";

/// All queues the delivery worker polls, in polling order.
pub const KNOWN_QUEUES: &[&str] = &[QUEUE_REMINDERS, QUEUE_NOTICES];
