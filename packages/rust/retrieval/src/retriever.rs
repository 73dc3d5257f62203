//! The retriever: web search fan-out over queries and providers, joined with
//! feed polling.

use std::sync::Arc;

use futures::future::join_all;
use grantscout_shared::{CandidateSource, FlatQuery, PipelineConfig, Result, RetryPolicy};
use tracing::{info, instrument};

use crate::feeds::{FeedReader, poll_feeds};
use crate::normalize::{combine_results, normalize_provider_results};
use crate::retry::search_with_fallback;
use crate::SearchProvider;

/// Retrieval knobs derived from [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct RetrieverSettings {
    pub max_results: u32,
    pub retry: RetryPolicy,
    pub feed_urls: Vec<String>,
    pub feed_limit: usize,
    pub feed_stamp_kind: bool,
}

impl From<&PipelineConfig> for RetrieverSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_results: config.search_max_results,
            retry: config.search_retry.clone(),
            feed_urls: config.feed_urls.clone(),
            feed_limit: config.feed_limit,
            feed_stamp_kind: config.feed_stamp_kind,
        }
    }
}

pub struct Retriever {
    providers: Vec<Arc<dyn SearchProvider>>,
    feeds: Arc<dyn FeedReader>,
    settings: RetrieverSettings,
}

impl Retriever {
    pub fn new(
        providers: Vec<Arc<dyn SearchProvider>>,
        feeds: Arc<dyn FeedReader>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            providers,
            feeds,
            settings,
        }
    }

    /// Web search results followed by feed results.
    ///
    /// The two families run concurrently; neither can fail the call.
    #[instrument(skip_all, fields(queries = queries.len(), providers = self.providers.len()))]
    pub async fn retrieve(&self, queries: &[FlatQuery]) -> Vec<CandidateSource> {
        let (web, feeds) = tokio::join!(self.search_all(queries), self.poll_feeds());
        info!(web = web.len(), feeds = feeds.len(), "retrieval complete");
        combine_results([web, feeds])
    }

    /// Query every provider for every query concurrently.
    ///
    /// Results are concatenated query by query, provider by provider, in the
    /// order given, each stamped with its query's kind.
    pub async fn search_all(&self, queries: &[FlatQuery]) -> Vec<CandidateSource> {
        let per_query = queries.iter().map(|q| self.search_one(q));
        combine_results(join_all(per_query).await)
    }

    async fn search_one(&self, query: &FlatQuery) -> Vec<CandidateSource> {
        let calls = self.providers.iter().map(|provider| async move {
            let raw = search_with_fallback(
                provider.as_ref(),
                &query.query,
                self.settings.max_results,
                &self.settings.retry,
            )
            .await;
            normalize_provider_results(provider.kind(), &raw)
        });

        let mut candidates = combine_results(join_all(calls).await);
        for candidate in &mut candidates {
            candidate.kind = Some(query.kind);
        }
        candidates
    }

    pub async fn poll_feeds(&self) -> Vec<CandidateSource> {
        poll_feeds(
            self.feeds.as_ref(),
            &self.settings.feed_urls,
            self.settings.feed_limit,
            self.settings.feed_stamp_kind,
        )
        .await
    }
}

/// URL of the first usable result of a single search, if any.
///
/// This is one call without retries; errors propagate to the caller.
pub async fn first_result_url(
    provider: &dyn SearchProvider,
    query: &str,
    max_results: u32,
) -> Result<Option<String>> {
    let raw = provider.search(query, max_results).await?;
    Ok(normalize_provider_results(provider.kind(), &raw)
        .into_iter()
        .find_map(|c| c.url))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FeedEntry, ProviderKind};
    use async_trait::async_trait;
    use grantscout_shared::{GrantScoutError, OpportunityKind};
    use serde_json::{Value, json};
    use std::time::Duration;

    struct Echo(ProviderKind);

    #[async_trait]
    impl SearchProvider for Echo {
        fn kind(&self) -> ProviderKind {
            self.0
        }

        async fn search(&self, query: &str, _max_results: u32) -> Result<Value> {
            Ok(match self.0 {
                ProviderKind::Tavily => json!([{"title": format!("T:{query}"), "url": format!("https://t.org/{query}")}]),
                ProviderKind::Brave => json!([{"title": format!("B:{query}"), "link": format!("https://b.org/{query}")}]),
            })
        }
    }

    struct Down;

    #[async_trait]
    impl SearchProvider for Down {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Brave
        }

        async fn search(&self, _query: &str, _max_results: u32) -> Result<Value> {
            Err(GrantScoutError::search("brave", "503"))
        }
    }

    struct OneFeed;

    #[async_trait]
    impl FeedReader for OneFeed {
        async fn read(&self, url: &str) -> Result<Vec<FeedEntry>> {
            if url == "bad" {
                return Err(GrantScoutError::feed(url, "unreachable"));
            }
            Ok(vec![FeedEntry {
                title: Some("Feed item".into()),
                link: Some("https://feed.org/1".into()),
                summary: None,
            }])
        }
    }

    fn settings(feed_urls: Vec<&str>) -> RetrieverSettings {
        RetrieverSettings {
            max_results: 3,
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                attempt_timeout: None,
            },
            feed_urls: feed_urls.into_iter().map(String::from).collect(),
            feed_limit: 5,
            feed_stamp_kind: true,
        }
    }

    fn queries() -> Vec<FlatQuery> {
        vec![
            FlatQuery { query: "q1".into(), kind: OpportunityKind::International },
            FlatQuery { query: "q2".into(), kind: OpportunityKind::National },
        ]
    }

    #[tokio::test]
    async fn web_results_are_ordered_and_stamped_then_feeds() {
        let providers: Vec<Arc<dyn SearchProvider>> =
            vec![Arc::new(Echo(ProviderKind::Tavily)), Arc::new(Echo(ProviderKind::Brave))];
        let retriever = Retriever::new(providers, Arc::new(OneFeed), settings(vec!["good"]));

        let out = retriever.retrieve(&queries()).await;
        let titles: Vec<&str> = out.iter().map(|c| c.title.as_str()).collect();

        assert_eq!(titles, vec!["T:q1", "B:q1", "T:q2", "B:q2", "Feed item"]);
        assert_eq!(out[0].kind, Some(OpportunityKind::International));
        assert_eq!(out[3].kind, Some(OpportunityKind::National));
        assert_eq!(out[3].url.as_deref(), Some("https://b.org/q2"));
        assert_eq!(out[4].kind, Some(OpportunityKind::Rss));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_outage_and_feed_failure_only_reduce_recall() {
        let providers: Vec<Arc<dyn SearchProvider>> =
            vec![Arc::new(Echo(ProviderKind::Tavily)), Arc::new(Down)];
        let retriever = Retriever::new(providers, Arc::new(OneFeed), settings(vec!["bad", "good"]));

        let out = retriever.retrieve(&queries()).await;
        let titles: Vec<&str> = out.iter().map(|c| c.title.as_str()).collect();

        assert_eq!(titles, vec!["T:q1", "T:q2", "Feed item"]);
    }

    #[tokio::test]
    async fn no_queries_and_no_feeds_is_empty() {
        let retriever = Retriever::new(Vec::new(), Arc::new(OneFeed), settings(vec![]));
        assert!(retriever.retrieve(&[]).await.is_empty());
    }

    #[tokio::test]
    async fn first_result_url_picks_first_link() {
        let url = first_result_url(&Echo(ProviderKind::Brave), "x", 1).await.expect("search");
        assert_eq!(url.as_deref(), Some("https://b.org/x"));
    }
}
