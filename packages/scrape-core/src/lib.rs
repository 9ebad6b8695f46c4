//! Scrape Orchestration Core
//!
//! Schedules, escalates, budgets and reports on scrape jobs against
//! arbitrary web domains. Content parsing lives behind [`RecordExtractor`];
//! this crate is the machinery around it.
//!
//! # Components
//!
//! - [`escalation`] - Tier selection and escalate/stop decisions
//! - [`budget`] - Cost ledger, budget checks and threshold alerts
//! - [`processor`] - The per-job escalation loop a worker runs
//! - [`webhook`] - Delivery queue with retry schedule and dead letters
//! - [`discovery`] - Free-text query to deduplicated scrape targets
//! - [`trigger`] - Recurring tracked domains and searches
//! - [`service`] - Validated submission surface
//! - [`stores`] - Storage implementations (MemoryStore, PostgresStore)
//! - [`testing`] - Mock collaborators for tests
//!
//! # Usage
//!
//! ```rust,ignore
//! use scrape_core::{JobProcessor, MemoryStore, OrchestratorConfig};
//! use scrape_core::testing::{MockExtractor, MockFetcher, RecordingAlertSink};
//!
//! let store = Arc::new(MemoryStore::new());
//! let processor = JobProcessor::new(
//!     store.clone(),
//!     Arc::new(MockFetcher::new()),
//!     Arc::new(MockExtractor::new()),
//!     Arc::new(RecordingAlertSink::default()),
//!     OrchestratorConfig::default(),
//! );
//!
//! for job in store.claim_jobs("worker-1", 10, now, lease_until).await? {
//!     let report = processor.process(&job).await?;
//! }
//! ```

pub mod budget;
pub mod config;
pub mod discovery;
pub mod error;
pub mod escalation;
pub mod processor;
pub mod service;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod trigger;
pub mod types;
pub mod webhook;

pub use budget::CostTracker;
pub use config::{
    BudgetConfig, DiscoveryConfig, EscalationConfig, OrchestratorConfig, TriggerConfig,
    WebhookConfig, WorkerConfig,
};
pub use discovery::{classify_destination, extract_unique_domains, root_domain, DiscoveryPipeline};
pub use error::{
    ExtractError, FetchError, Result, ScrapeError, SearchError, StoreError, StoreResult,
    TransportError,
};
pub use escalation::{EscalationEngine, Signal, Verdict, MANUAL_REVIEW_REQUIRED};
pub use processor::{AttemptLog, JobProcessor, JobReport};
pub use service::{DiscoveryView, Orchestrator};
pub use trigger::{RecurringTrigger, TriggerReport};
pub use webhook::{DrainReport, WebhookDispatcher};

pub use traits::{
    AlertSink, DestinationHandler, DiscoverySpawn, DiscoveryStore, ExtractedRecord, Extraction,
    FetchRequest, FetchResponse, Fetcher, JobStore, LedgerStore, LogAlertSink, MetadataStore,
    RecordExtractor, SearchHit, SearchQuery, SearchResponse, Searcher, Store, TrackedStore,
    WebhookRequest, WebhookStore, WebhookTransport,
};
pub use types::{
    AlertLevel, BudgetAlert, BudgetCeilings, BudgetDecision, BudgetScope, BudgetWindow, CostEntry,
    DeadLetter, DeliveryFailure, DeliveryStatus, DestinationKind, DiscoveryJob, DiscoveryJobDomain,
    DiscoveryStatus, DomainMetadata, Frequency, JobOutcome, JobStatus, LinkStatus, MetadataUpdate,
    NewDiscovery, NewScrapeJob, NewTrackedDomain, NewTrackedSearch, ResultSummary, ScrapeJob,
    ScrapedRecord, SearchMode, SearchParams, Tier, TrackedDomain, TrackedSearch, WebhookDelivery,
    WebhookPayload,
};

pub use stores::MemoryStore;

#[cfg(feature = "postgres")]
pub use stores::PostgresStore;
