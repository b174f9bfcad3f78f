//! Web capabilities consumed by investigation workers
//!
//! [`WebCapabilities`] is the narrow search/fetch interface the pipeline depends
//! on. The default backend is the daedra crate, which uses DuckDuckGo for
//! search and converts fetched pages to markdown.

use crate::research::types::{PageContent, SourceHit};
use crate::types::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// Search and fetch primitives.
///
/// A failed call is an `Err`; a search that found nothing is `Ok(vec![])`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WebCapabilities: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<SourceHit>>;

    async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<PageContent>;
}

#[cfg(feature = "daedra")]
pub use self::daedra_backend::DaedraCapabilities;

#[cfg(feature = "daedra")]
mod daedra_backend {
    use super::WebCapabilities;
    use crate::llm::client::cancellable;
    use crate::research::types::{PageContent, SourceHit};
    use crate::types::{AppError, Result};
    use async_trait::async_trait;
    use daedra::DaedraError;
    use tokio_util::sync::CancellationToken;
    use tracing::debug;

    /// Web search and page fetching powered by daedra
    #[derive(Debug, Clone, Default)]
    pub struct DaedraCapabilities;

    impl DaedraCapabilities {
        pub fn new() -> Self {
            Self
        }
    }

    /// daedra already backs off internally; what escapes is either a raw
    /// HTTP failure or one of its own rate-limit/timeout verdicts.
    pub(super) fn classify(context: &str, err: DaedraError) -> AppError {
        match err {
            DaedraError::HttpError(ref http) => AppError::from_http_failure(context, http),
            DaedraError::RateLimitExceeded | DaedraError::Timeout => {
                AppError::transient(format!("{}: {}", context, err))
            }
            other => AppError::transport(format!("{}: {}", context, other)),
        }
    }

    pub(super) fn to_hit(result: daedra::SearchResult) -> Option<SourceHit> {
        if result.url.is_empty() {
            return None;
        }
        Some(SourceHit::new(result.url, result.title, result.description))
    }

    pub(super) fn to_page(requested: &str, page: daedra::types::PageContent) -> PageContent {
        PageContent {
            url: if page.url.is_empty() {
                requested.to_string()
            } else {
                page.url
            },
            title: (!page.title.is_empty()).then_some(page.title),
            text: page.content,
        }
    }

    #[async_trait]
    impl WebCapabilities for DaedraCapabilities {
        async fn search(
            &self,
            query: &str,
            max_results: usize,
            cancel: &CancellationToken,
        ) -> Result<Vec<SourceHit>> {
            let search_args = daedra::SearchArgs {
                query: query.to_string(),
                options: Some(daedra::SearchOptions {
                    num_results: max_results,
                    ..Default::default()
                }),
            };

            let response = cancellable(cancel, async {
                daedra::tools::search::perform_search(&search_args)
                    .await
                    .map_err(|e| classify("Search failed", e))
            })
            .await?;

            let hits: Vec<SourceHit> = response
                .data
                .into_iter()
                .filter_map(to_hit)
                .take(max_results)
                .collect();

            debug!(query, count = hits.len(), "daedra search completed");
            Ok(hits)
        }

        async fn fetch(&self, url: &str, cancel: &CancellationToken) -> Result<PageContent> {
            let fetch_args = daedra::VisitPageArgs {
                url: url.to_string(),
                include_images: false,
                selector: None,
            };

            let page = cancellable(cancel, async {
                daedra::tools::fetch::fetch_page(&fetch_args)
                    .await
                    .map_err(|e| classify("Failed to fetch page", e))
            })
            .await?;

            Ok(to_page(url, page))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_distinguishes_failure_from_empty() {
        let mut web = MockWebCapabilities::new();
        web.expect_search()
            .withf(|query, max, _| query == "nothing" && *max == 3)
            .returning(|_, _, _| Ok(vec![]));
        web.expect_search()
            .withf(|query, _, _| query == "broken")
            .returning(|_, _, _| Err(crate::types::AppError::transient("503")));

        let cancel = CancellationToken::new();
        assert!(web.search("nothing", 3, &cancel).await.unwrap().is_empty());
        assert!(web.search("broken", 3, &cancel).await.is_err());
    }

    #[cfg(feature = "daedra")]
    #[test]
    fn test_daedra_errors_are_classified_by_kind() {
        use daedra::DaedraError;

        assert!(daedra_backend::classify("Search failed", DaedraError::RateLimitExceeded).is_retryable());
        assert!(daedra_backend::classify("Search failed", DaedraError::Timeout).is_retryable());

        // A 404 whose body happens to say "connection" stays permanent.
        let err = daedra_backend::classify(
            "Failed to fetch page",
            DaedraError::FetchError("HTTP 404 Not Found: connection guide moved".into()),
        );
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "transport_failed");
    }

    #[cfg(feature = "daedra")]
    #[test]
    fn test_daedra_page_maps_typed_fields() {
        let page: daedra::types::PageContent = serde_json::from_value(serde_json::json!({
            "url": "",
            "title": "",
            "content": "# Tokio",
            "timestamp": "2025-01-01T00:00:00Z",
            "word_count": 2
        }))
        .unwrap();
        let mapped = daedra_backend::to_page("https://tokio.rs", page);
        assert_eq!(mapped.url, "https://tokio.rs");
        assert!(mapped.title.is_none());
        assert_eq!(mapped.text, "# Tokio");
    }

    #[cfg(feature = "daedra")]
    #[tokio::test]
    async fn test_daedra_respects_cancellation() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let web = DaedraCapabilities::new();
        let err = web.search("rust", 3, &cancel).await.unwrap_err();
        assert_eq!(err.kind(), "cancelled");
    }
}
