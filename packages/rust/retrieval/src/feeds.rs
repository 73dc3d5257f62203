//! RSS/Atom feed polling.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use grantscout_shared::{CandidateSource, GrantScoutError, OpportunityKind, Result};
use reqwest::Client;
use tracing::{info, instrument, warn};

use crate::{NO_TITLE, USER_AGENT};

/// One feed entry, reduced to the fields candidates need.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub summary: Option<String>,
}

/// Reads a feed URL into its entries, in feed order.
#[async_trait]
pub trait FeedReader: Send + Sync {
    async fn read(&self, url: &str) -> Result<Vec<FeedEntry>>;
}

/// Fetches feeds over HTTP and parses them with `feed-rs` (RSS 0.9-2.0, Atom, JSON Feed).
pub struct HttpFeedReader {
    http: Client,
}

impl HttpFeedReader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GrantScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl FeedReader for HttpFeedReader {
    async fn read(&self, url: &str) -> Result<Vec<FeedEntry>> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GrantScoutError::feed(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantScoutError::feed(url, format!("HTTP {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GrantScoutError::feed(url, format!("failed to read body: {e}")))?;

        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| GrantScoutError::feed(url, format!("failed to parse feed: {e}")))?;

        Ok(feed
            .entries
            .into_iter()
            .map(|entry| FeedEntry {
                title: entry.title.map(|t| t.content),
                link: entry.links.into_iter().next().map(|l| l.href),
                summary: entry
                    .summary
                    .map(|s| s.content)
                    .or_else(|| entry.content.and_then(|c| c.body)),
            })
            .collect())
    }
}

/// Poll every feed concurrently, taking at most `limit_per_feed` entries each.
///
/// A feed that fails to load contributes nothing; the others are unaffected.
/// Output keeps feed order, then entry order.
#[instrument(skip_all, fields(feeds = urls.len()))]
pub async fn poll_feeds(
    reader: &dyn FeedReader,
    urls: &[String],
    limit_per_feed: usize,
    stamp_kind: bool,
) -> Vec<CandidateSource> {
    let reads = urls.iter().map(|url| async move { (url, reader.read(url).await) });
    let kind = stamp_kind.then_some(OpportunityKind::Rss);

    let mut candidates = Vec::new();
    for (url, outcome) in join_all(reads).await {
        match outcome {
            Ok(entries) => {
                let before = candidates.len();
                candidates.extend(entries.into_iter().take(limit_per_feed).map(|e| {
                    CandidateSource {
                        title: non_blank(e.title).unwrap_or_else(|| NO_TITLE.to_string()),
                        url: non_blank(e.link),
                        description: non_blank(e.summary),
                        kind,
                    }
                }));
                info!(%url, entries = candidates.len() - before, "feed polled");
            }
            Err(e) => warn!(%url, error = %e, "feed read failed, skipping"),
        }
    }
    candidates
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
