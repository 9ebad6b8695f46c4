//! Root-domain extraction, destination classification and deduplication.

use std::collections::HashSet;

use indexmap::IndexMap;
use url::Url;

use crate::traits::SearchHit;
use crate::types::DestinationKind;

const VIDEO_HOSTS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "tiktok.com",
    "dailymotion.com",
];

const PROFESSIONAL_NETWORKS: &[&str] = &["linkedin.com"];

const SOCIAL_MEDIA: &[&str] = &[
    "facebook.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "reddit.com",
];

/// Normalized host of a URL: lower-cased, without `www.` or port.
///
/// Bare hosts (`a.com/path`) are accepted as if they had an `https` scheme.
pub fn root_domain(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.has_host())
        .or_else(|| Url::parse(&format!("https://{}", trimmed)).ok())?;

    let host = parsed.host_str()?.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();

    if host.is_empty() || !host.contains('.') {
        return None;
    }
    Some(host)
}

fn matches_any(domain: &str, known: &[&str]) -> bool {
    known.iter().any(|k| {
        domain == *k
            || domain
                .strip_suffix(k)
                .map(|prefix| prefix.ends_with('.'))
                .unwrap_or(false)
    })
}

/// Classify a normalized domain by what it hosts.
///
/// Matches the domain itself or any parent (`m.youtube.com` is video).
pub fn classify_destination(domain: &str) -> DestinationKind {
    if matches_any(domain, VIDEO_HOSTS) {
        DestinationKind::Video
    } else if matches_any(domain, PROFESSIONAL_NETWORKS) {
        DestinationKind::ProfessionalNetwork
    } else if matches_any(domain, SOCIAL_MEDIA) {
        DestinationKind::SocialMedia
    } else {
        DestinationKind::Domain
    }
}

/// One hit per domain, keeping the highest-scoring hit.
///
/// Missing scores count as zero; ties keep the first hit seen. Domains in
/// `skip` and hits without a usable host are dropped. Iteration order is
/// first-seen order.
pub fn extract_unique_domains(
    hits: &[SearchHit],
    skip: &HashSet<String>,
) -> IndexMap<String, SearchHit> {
    let mut unique: IndexMap<String, SearchHit> = IndexMap::new();

    for hit in hits {
        let Some(domain) = root_domain(&hit.url) else {
            continue;
        };
        if skip.contains(&domain) {
            continue;
        }

        match unique.get_mut(&domain) {
            Some(existing) if hit.score_or_zero() > existing.score_or_zero() => {
                *existing = hit.clone();
            }
            Some(_) => {}
            None => {
                unique.insert(domain, hit.clone());
            }
        }
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_domain_normalization() {
        assert_eq!(root_domain("https://WWW.Example.COM/about?x=1").as_deref(), Some("example.com"));
        assert_eq!(root_domain("http://shop.example.com:8080/").as_deref(), Some("shop.example.com"));
        assert_eq!(root_domain("a.com/x").as_deref(), Some("a.com"));
        assert_eq!(root_domain("not a url"), None);
        assert_eq!(root_domain(""), None);
    }

    #[test]
    fn test_classification_matches_parent_domains() {
        assert_eq!(classify_destination("youtube.com"), DestinationKind::Video);
        assert_eq!(classify_destination("m.youtube.com"), DestinationKind::Video);
        assert_eq!(
            classify_destination("linkedin.com"),
            DestinationKind::ProfessionalNetwork
        );
        assert_eq!(classify_destination("x.com"), DestinationKind::SocialMedia);
        // Suffix match must align on a label boundary.
        assert_eq!(classify_destination("box.com"), DestinationKind::Domain);
        assert_eq!(classify_destination("acme-plumbing.com"), DestinationKind::Domain);
    }

    #[test]
    fn test_dedup_keeps_highest_score_per_domain() {
        let hits = vec![
            SearchHit::new("https://a.com/x").with_score(1.0),
            SearchHit::new("https://a.com/y").with_score(5.0),
            SearchHit::new("https://b.com/z").with_score(2.0),
        ];

        let unique = extract_unique_domains(&hits, &HashSet::new());
        assert_eq!(unique.len(), 2);
        assert_eq!(unique["a.com"].url, "https://a.com/y");
        assert_eq!(unique["a.com"].score, Some(5.0));
        assert_eq!(unique["b.com"].url, "https://b.com/z");
        assert_eq!(
            unique.keys().cloned().collect::<Vec<_>>(),
            vec!["a.com".to_string(), "b.com".to_string()]
        );
    }

    #[test]
    fn test_dedup_treats_missing_score_as_zero_and_honours_skip_list() {
        let hits = vec![
            SearchHit::new("https://www.a.com/"),
            SearchHit::new("https://a.com/contact").with_score(0.1),
            SearchHit::new("https://skip.me/"),
        ];
        let skip: HashSet<String> = ["skip.me".to_string()].into_iter().collect();

        let unique = extract_unique_domains(&hits, &skip);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique["a.com"].url, "https://a.com/contact");
    }
}
