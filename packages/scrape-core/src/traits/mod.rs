//! Capability contracts for external collaborators and storage.

pub mod alerts;
pub mod extractor;
pub mod fetcher;
pub mod searcher;
pub mod store;
pub mod transport;

pub use alerts::{AlertSink, LogAlertSink};
pub use extractor::{DestinationHandler, ExtractedRecord, Extraction, RecordExtractor};
pub use fetcher::{FetchRequest, FetchResponse, Fetcher};
pub use searcher::{SearchHit, SearchQuery, SearchResponse, Searcher};
pub use store::{
    DiscoverySpawn, DiscoveryStore, JobStore, LedgerStore, MetadataStore, Store, TrackedStore,
    WebhookStore,
};
pub use transport::{WebhookRequest, WebhookTransport};
