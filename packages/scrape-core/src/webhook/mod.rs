//! Webhook delivery with bounded retries and a dead-letter store.

pub mod queue;
pub mod schedule;

pub use queue::{DrainReport, WebhookDispatcher};
pub use schedule::{retry_delay, Transition, MAX_ATTEMPTS, RETRY_SCHEDULE_SECS};
