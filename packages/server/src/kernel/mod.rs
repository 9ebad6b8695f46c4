//! Kernel module - background services and outbound HTTP adapters.

pub mod destinations;
pub mod http_fetcher;
pub mod jobs;
pub mod page_extractor;
pub mod scheduled_tasks;
pub mod search_client;
pub mod service_host;
pub mod webhook_transport;

pub use destinations::LogDestinationHandler;
pub use http_fetcher::HttpFetcher;
pub use page_extractor::PageSnapshotExtractor;
pub use search_client::SearchClient;
pub use service_host::{Service, ServiceHost};
pub use webhook_transport::HttpWebhookTransport;
