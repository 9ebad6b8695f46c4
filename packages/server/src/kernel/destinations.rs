use async_trait::async_trait;
use scrape_core::{DestinationHandler, DestinationKind, SearchHit};
use uuid::Uuid;

/// Logs video, professional-network and social-media hits found by
/// discovery. These are not scraped by this service.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDestinationHandler;

#[async_trait]
impl DestinationHandler for LogDestinationHandler {
    async fn handle(&self, discovery_id: Uuid, kind: DestinationKind, hit: &SearchHit) {
        tracing::info!(
            discovery_id = %discovery_id,
            kind = %kind,
            url = %hit.url,
            title = hit.title.as_deref().unwrap_or(""),
            "non-domain search hit routed"
        );
    }
}
