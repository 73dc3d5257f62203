//! Tavily search API (`POST /search`).

use std::time::Duration;

use async_trait::async_trait;
use grantscout_shared::{GrantScoutError, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::{ProviderKind, SearchProvider, USER_AGENT};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

#[derive(Debug, Serialize)]
struct TavilySearchRequest<'a> {
    api_key: &'a str,
    query: &'a str,
    max_results: u32,
    search_depth: &'static str,
    include_answer: bool,
}

/// Tavily provider. Raw results are `[{title, url, content, score}]`.
pub struct TavilyProvider {
    http: Client,
    api_key: String,
    base_url: String,
}

impl TavilyProvider {
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
impl SearchProvider for TavilyProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Tavily
    }

    #[instrument(skip_all, fields(provider = "tavily", %query))]
    async fn search(&self, query: &str, max_results: u32) -> Result<Value> {
        let request = TavilySearchRequest {
            api_key: &self.api_key,
            query,
            max_results,
            search_depth: "basic",
            include_answer: false,
        };

        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&request)
            .send()
            .await
            .map_err(|e| GrantScoutError::search("tavily", e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantScoutError::search("tavily", format!("HTTP {status}")));
        }

        let mut body: Value = response
            .json()
            .await
            .map_err(|e| GrantScoutError::search("tavily", format!("malformed response: {e}")))?;

        let results = body
            .get_mut("results")
            .map(Value::take)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        debug!(hits = results.as_array().map_or(0, Vec::len), "tavily results");
        Ok(results)
    }
}
