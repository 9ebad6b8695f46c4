//! Domain types for the orchestration core.

pub mod budget;
pub mod discovery;
pub mod domain;
pub mod job;
pub mod tier;
pub mod tracked;
pub mod webhook;

pub use budget::{
    AlertLevel, BudgetAlert, BudgetCeilings, BudgetDecision, BudgetScope, BudgetWindow, CostEntry,
};
pub use discovery::{
    DestinationKind, DiscoveryJob, DiscoveryJobDomain, DiscoveryStatus, LinkStatus, NewDiscovery,
    SearchMode, SearchParams,
};
pub use domain::{DomainMetadata, MetadataUpdate};
pub use job::{JobOutcome, JobStatus, NewScrapeJob, ScrapeJob, ScrapedRecord};
pub use tier::Tier;
pub use tracked::{Frequency, NewTrackedDomain, NewTrackedSearch, TrackedDomain, TrackedSearch};
pub use webhook::{
    DeadLetter, DeliveryFailure, DeliveryStatus, ResultSummary, WebhookDelivery, WebhookPayload,
};
