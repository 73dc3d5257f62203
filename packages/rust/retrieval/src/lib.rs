//! Candidate-source retrieval: web search fan-out plus RSS/Atom feed fan-in.
//!
//! Search providers and feeds are external collaborators behind the
//! [`SearchProvider`] and [`FeedReader`] traits. The [`Retriever`] wraps every
//! provider call in a bounded retry with an empty-list fallback, so a provider
//! outage reduces recall without aborting the run.

mod brave;
mod feeds;
mod normalize;
mod retriever;
mod retry;
mod tavily;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use grantscout_shared::{Credentials, GrantScoutError, Result, SearchConfig};
use serde_json::Value;

pub use brave::BraveProvider;
pub use feeds::{FeedEntry, FeedReader, HttpFeedReader, poll_feeds};
pub use normalize::{
    NO_TITLE, combine_results, flatten_queries, normalize_provider_results,
    normalize_search_results,
};
pub use retriever::{Retriever, RetrieverSettings, first_result_url};
pub use retry::{retry_with_backoff, search_with_fallback};
pub use tavily::TavilyProvider;

/// User-Agent string for outbound requests.
pub(crate) const USER_AGENT: &str = concat!("GrantScout/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Providers
// ---------------------------------------------------------------------------

/// Which search backend produced a raw result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Tavily,
    Brave,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tavily => "tavily",
            Self::Brave => "brave",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GrantScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tavily" => Ok(Self::Tavily),
            "brave" => Ok(Self::Brave),
            other => Err(GrantScoutError::config(format!("unknown search provider: {other}"))),
        }
    }
}

/// A web search backend.
///
/// `search` returns the provider's raw result list; callers normalize it with
/// [`normalize_provider_results`] using [`SearchProvider::kind`].
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn search(&self, query: &str, max_results: u32) -> Result<Value>;
}

/// Build the configured providers that have an API key, in configured order.
pub fn build_providers(
    config: &SearchConfig,
    credentials: &Credentials,
) -> Result<Vec<Arc<dyn SearchProvider>>> {
    let timeout = std::time::Duration::from_secs(config.attempt_timeout_secs);
    let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();

    for name in &config.providers {
        match name.parse::<ProviderKind>()? {
            ProviderKind::Tavily => {
                if let Some(key) = &credentials.tavily_api_key {
                    providers.push(Arc::new(TavilyProvider::new(key.clone(), timeout)?));
                }
            }
            ProviderKind::Brave => {
                if let Some(key) = &credentials.brave_api_key {
                    providers.push(Arc::new(BraveProvider::new(key.clone(), timeout)?));
                }
            }
        }
    }

    Ok(providers)
}
