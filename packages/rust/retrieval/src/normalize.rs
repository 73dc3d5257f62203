//! Pure helpers between retrieval steps: query flattening, provider-result
//! normalization and result combination.

use grantscout_shared::{CandidateSource, FlatQuery, OpportunityKind, SearchQueryPair};
use serde_json::{Map, Value};
use tracing::debug;

use crate::ProviderKind;

/// Title used when a provider omits one.
pub const NO_TITLE: &str = "no title";

/// Split each query pair into independent international and national queries.
///
/// Order is preserved (international before national within a pair) and blank
/// sub-queries are dropped.
pub fn flatten_queries(pairs: &[SearchQueryPair]) -> Vec<FlatQuery> {
    pairs
        .iter()
        .flat_map(|pair| {
            [
                (&pair.international_query, OpportunityKind::International),
                (&pair.national_query, OpportunityKind::National),
            ]
        })
        .filter(|(query, _)| !query.trim().is_empty())
        .map(|(query, kind)| FlatQuery {
            query: query.trim().to_string(),
            kind,
        })
        .collect()
}

/// Concatenate result lists in order.
pub fn combine_results<T>(lists: impl IntoIterator<Item = Vec<T>>) -> Vec<T> {
    lists.into_iter().flatten().collect()
}

/// Normalize raw results from several providers into candidate sources.
///
/// Output follows the order of `raw`: every candidate of the first provider,
/// then of the second, and so on.
pub fn normalize_search_results(raw: &[(ProviderKind, Value)]) -> Vec<CandidateSource> {
    raw.iter()
        .flat_map(|(provider, results)| normalize_provider_results(*provider, results))
        .collect()
}

/// Normalize one provider's raw result list.
///
/// Brave results may arrive as a JSON-encoded string; an unparsable string
/// yields no candidates.
pub fn normalize_provider_results(provider: ProviderKind, raw: &Value) -> Vec<CandidateSource> {
    match provider {
        ProviderKind::Tavily => normalize_hits(raw, &["url"], &["content"]),
        ProviderKind::Brave => match raw {
            Value::String(encoded) => match serde_json::from_str::<Value>(encoded) {
                Ok(decoded) => normalize_hits(&decoded, &["link", "url"], &["snippet", "description"]),
                Err(e) => {
                    debug!(error = %e, "brave results are not valid JSON");
                    Vec::new()
                }
            },
            other => normalize_hits(other, &["link", "url"], &["snippet", "description"]),
        },
    }
}

fn normalize_hits(raw: &Value, url_keys: &[&str], text_keys: &[&str]) -> Vec<CandidateSource> {
    let Some(hits) = raw.as_array() else {
        return Vec::new();
    };

    hits.iter()
        .filter_map(Value::as_object)
        .map(|hit| CandidateSource {
            title: first_str(hit, &["title"]).unwrap_or_else(|| NO_TITLE.to_string()),
            url: first_str(hit, url_keys),
            description: first_str(hit, text_keys),
            kind: None,
        })
        .collect()
}

fn first_str(hit: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| hit.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
