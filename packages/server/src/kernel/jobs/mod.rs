//! Background workers for the scrape job queue and the webhook outbox.
//!
//! ```text
//! JobWorker (× WORKER_COUNT)
//!     │
//!     ├─► claim batch under a lease (store)
//!     ├─► JobProcessor.process(job) with heartbeat
//!     └─► terminal write + webhook delivery insert
//!
//! WebhookWorker
//!     │
//!     └─► WebhookDispatcher.drain_due(now)
//!             ├─► 2xx → delivered
//!             ├─► failure → retry at +1m, +5m, +15m, +1h
//!             └─► 5th failure → dead letter
//! ```

mod webhook_worker;
mod worker;

pub use webhook_worker::WebhookWorker;
pub use worker::{JobWorker, JobWorkerConfig};
