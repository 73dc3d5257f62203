//! Brave web search API (`GET /res/v1/web/search`).

use std::time::Duration;

use async_trait::async_trait;
use grantscout_shared::{GrantScoutError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, instrument};

use crate::{ProviderKind, SearchProvider, USER_AGENT};

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com";

#[derive(Debug, Default, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Brave provider. Raw results are mapped to `[{title, link, snippet}]`.
pub struct BraveProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

impl BraveProvider {
    pub fn new(api_key: String, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GrantScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the provider at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Brave
    }

    #[instrument(skip_all, fields(provider = "brave", %query))]
    async fn search(&self, query: &str, max_results: u32) -> Result<Value> {
        let count = max_results.to_string();
        let response = self
            .http
            .get(format!("{}/res/v1/web/search", self.base_url))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| GrantScoutError::search("brave", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantScoutError::search("brave", format!("HTTP {status}")));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| GrantScoutError::search("brave", format!("malformed response: {e}")))?;

        let results: Vec<Value> = body
            .web
            .unwrap_or_default()
            .results
            .into_iter()
            .map(|r| json!({"title": r.title, "link": r.url, "snippet": r.description}))
            .collect();

        debug!(hits = results.len(), "brave results");
        Ok(Value::Array(results))
    }
}
