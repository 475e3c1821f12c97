//! Retry backoff policy for transient delivery failures.
//!
//! The schedule is exponential with a hard cap: 30s, 2m, 10m. A job that
//! has already burned through the schedule is not retried again.

use std::time::Duration;

/// Retry delays indexed by the number of attempts already made.
const RETRY_SCHEDULE: &[Duration] = &[
    Duration::from_secs(30),
    Duration::from_secs(2 * 60),
    Duration::from_secs(10 * 60),
];

/// Maximum total delivery attempts before a job is failed permanently.
/// One initial attempt plus one retry per schedule entry.
pub const MAX_ATTEMPTS: i32 = RETRY_SCHEDULE.len() as i32 + 1;

/// Delay before the next retry given how many attempts have been made,
/// or `None` when the attempt ceiling is reached and the job should be
/// failed permanently.
pub fn retry_delay(attempts_made: i32) -> Option<Duration> {
    if attempts_made < 1 {
        return Some(RETRY_SCHEDULE[0]);
    }
    RETRY_SCHEDULE.get(attempts_made as usize - 1).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_is_exponential_with_cap() {
        assert_eq!(retry_delay(1), Some(Duration::from_secs(30)));
        assert_eq!(retry_delay(2), Some(Duration::from_secs(120)));
        assert_eq!(retry_delay(3), Some(Duration::from_secs(600)));
    }

    #[test]
    fn test_ceiling_exhausts_retries() {
        assert_eq!(retry_delay(4), None);
        assert_eq!(retry_delay(100), None);
        assert_eq!(MAX_ATTEMPTS, 4);
    }
}
