//! Discovery: free-text query to deduplicated scrape targets.

pub mod domains;
pub mod pipeline;

pub use domains::{classify_destination, extract_unique_domains, root_domain};
pub use pipeline::{
    DiscoveryPipeline, SKIP_DOMAIN_CAP, SKIP_PREVIOUSLY_DISCOVERED, SKIP_RECENTLY_SCRAPED,
};
