//! Default record extractor: one page snapshot per requested data type.
//!
//! Field-level parsing is done downstream from the `scraped_records`
//! notification channel. This extractor only records what was fetched (page
//! title, size and a content digest) so every completed job has records to
//! report and downstream consumers have something to key on.

use async_trait::async_trait;
use scrape_core::{ExtractError, ExtractedRecord, Extraction, FetchResponse, RecordExtractor, ScrapeJob};
use serde_json::json;
use sha2::{Digest, Sha256};

#[derive(Debug, Default, Clone, Copy)]
pub struct PageSnapshotExtractor;

#[async_trait]
impl RecordExtractor for PageSnapshotExtractor {
    async fn extract(&self, job: &ScrapeJob, response: &FetchResponse) -> Result<Extraction, ExtractError> {
        if response.content.trim().is_empty() {
            return Err(ExtractError("empty page".to_string()));
        }

        let source_url = job.target_url();
        let title = page_title(&response.content);
        let digest = hex::encode(Sha256::digest(response.content.as_bytes()));

        let records = job
            .data_types
            .iter()
            .map(|data_type| ExtractedRecord {
                data_type: data_type.clone(),
                source_url: source_url.clone(),
                title: title.clone(),
                payload: json!({
                    "status_code": response.status_code,
                    "content_length": response.content.len(),
                    "sha256": digest,
                }),
            })
            .collect();

        Ok(Extraction {
            pages_scraped: 1,
            records,
        })
    }
}

/// Text of the first `<title>` element, trimmed.
fn page_title(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title")?;
    let title = html[start..end].trim();
    (!title.is_empty()).then(|| title.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use scrape_core::NewScrapeJob;

    fn job() -> ScrapeJob {
        ScrapeJob::new(
            NewScrapeJob::builder()
                .domain("acme.com")
                .data_types(vec!["business_info".to_string(), "contacts".to_string()])
                .build(),
            Utc::now(),
        )
    }

    #[test]
    fn test_page_title() {
        assert_eq!(
            page_title("<html><head><TITLE lang=\"en\"> Acme Plumbing </TITLE></head></html>"),
            Some("Acme Plumbing".to_string())
        );
        assert_eq!(page_title("<html><title></title></html>"), None);
        assert_eq!(page_title("no markup"), None);
    }

    #[tokio::test]
    async fn test_one_record_per_data_type() {
        let response = FetchResponse::ok("<title>Acme</title><p>hello</p>", Decimal::ZERO);
        let extraction = PageSnapshotExtractor.extract(&job(), &response).await.unwrap();

        assert_eq!(extraction.pages_scraped, 1);
        assert_eq!(extraction.records.len(), 2);
        assert_eq!(extraction.records[0].data_type, "business_info");
        assert_eq!(extraction.records[1].data_type, "contacts");
        assert_eq!(extraction.records[0].source_url, "https://acme.com/");
        assert_eq!(extraction.records[0].title.as_deref(), Some("Acme"));
        assert_eq!(extraction.records[0].payload["content_length"], 31);
    }

    #[test]
    fn test_empty_page_is_an_error() {
        let response = FetchResponse::ok("   ", Decimal::ZERO);
        let err = tokio_test::block_on(PageSnapshotExtractor.extract(&job(), &response)).unwrap_err();
        assert_eq!(err.to_string(), "extraction failed: empty page");
    }
}
