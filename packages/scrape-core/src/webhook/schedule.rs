//! Retry schedule and per-attempt state transitions for webhook deliveries.

use chrono::{DateTime, Duration, Utc};

/// Delay before each attempt, indexed by the number of attempts already made:
/// immediate, +1 minute, +5 minutes, +15 minutes, +1 hour.
pub const RETRY_SCHEDULE_SECS: [i64; 5] = [0, 60, 300, 900, 3600];

/// Total attempts before an entry is dead-lettered.
pub const MAX_ATTEMPTS: i32 = RETRY_SCHEDULE_SECS.len() as i32;

/// Delay before the attempt that follows `attempts_made` attempts.
///
/// Attempt counts beyond the table reuse its last step.
pub fn retry_delay(attempts_made: i32) -> Duration {
    let index = attempts_made.clamp(0, MAX_ATTEMPTS - 1) as usize;
    Duration::seconds(RETRY_SCHEDULE_SECS[index])
}

/// Where an entry goes after a delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Delivered,
    Retry { next_retry_at: DateTime<Utc> },
    DeadLetter,
}

/// Decide the next state after attempt number `attempt` (1-based).
pub fn after_attempt(
    attempt: i32,
    max_attempts: i32,
    succeeded: bool,
    now: DateTime<Utc>,
) -> Transition {
    if succeeded {
        Transition::Delivered
    } else if attempt >= max_attempts {
        Transition::DeadLetter
    } else {
        Transition::Retry {
            next_retry_at: now + retry_delay(attempt),
        }
    }
}

/// Whether an HTTP status counts as a successful delivery.
pub fn is_success_status(status: u16) -> bool {
    (200..300).contains(&status)
}
