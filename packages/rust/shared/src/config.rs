//! Application configuration for GrantScout.
//!
//! User config lives at `~/.grantscout/grantscout.toml`.
//! CLI flags override config file values, which override defaults.
//! API keys are never stored in the file: each section names the environment
//! variable that holds its key.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GrantScoutError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "grantscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".grantscout";

// ---------------------------------------------------------------------------
// Config structs (matching grantscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Structured-inference provider settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Web search providers.
    #[serde(default)]
    pub search: SearchConfig,

    /// RSS/Atom feeds polled alongside web search.
    #[serde(default)]
    pub feeds: FeedsConfig,

    /// Delays between rate-limited calls.
    #[serde(default)]
    pub pacing: PacingConfig,

    /// Relevance filter behaviour.
    #[serde(default)]
    pub filter: FilterConfig,

    /// Page-content ceilings fed to inference.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Output file names.
    #[serde(default)]
    pub output: OutputConfig,
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// OpenAI-compatible chat completions base URL.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Model used to expand the project brief into queries.
    #[serde(default = "default_fast_model")]
    pub query_model: String,

    /// Model used to classify candidate sources.
    #[serde(default = "default_fast_model")]
    pub classifier_model: String,

    /// Model used to extract opportunities from page text.
    #[serde(default = "default_strong_model")]
    pub extractor_model: String,

    /// Model used to refine opportunities during enrichment.
    #[serde(default = "default_fast_model")]
    pub enricher_model: String,

    #[serde(default = "default_query_temperature")]
    pub query_temperature: f32,

    #[serde(default = "default_low_temperature")]
    pub classifier_temperature: f32,

    #[serde(default)]
    pub extractor_temperature: f32,

    #[serde(default = "default_low_temperature")]
    pub enricher_temperature: f32,

    /// Request timeout for a single inference call.
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            query_model: default_fast_model(),
            classifier_model: default_fast_model(),
            extractor_model: default_strong_model(),
            enricher_model: default_fast_model(),
            query_temperature: default_query_temperature(),
            classifier_temperature: default_low_temperature(),
            extractor_temperature: 0.0,
            enricher_temperature: default_low_temperature(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_fast_model() -> String {
    "google/gemini-flash-1.5".into()
}
fn default_strong_model() -> String {
    "google/gemini-pro-1.5".into()
}
fn default_query_temperature() -> f32 {
    0.2
}
fn default_low_temperature() -> f32 {
    0.1
}
fn default_llm_timeout() -> u64 {
    120
}

/// `[search]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Providers queried for every flat query, in this order.
    #[serde(default = "default_providers")]
    pub providers: Vec<String>,

    #[serde(default = "default_tavily_key_env")]
    pub tavily_api_key_env: String,

    #[serde(default = "default_brave_key_env")]
    pub brave_api_key_env: String,

    /// Result-count hint passed to each provider.
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Attempt ceiling per provider call (first try included).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    /// Timeout for a single provider attempt.
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_secs: u64,

    /// Result-count hint for the enricher's fallback URL search.
    #[serde(default = "default_fallback_max_results")]
    pub fallback_max_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            tavily_api_key_env: default_tavily_key_env(),
            brave_api_key_env: default_brave_key_env(),
            max_results: default_max_results(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            attempt_timeout_secs: default_attempt_timeout(),
            fallback_max_results: default_fallback_max_results(),
        }
    }
}

fn default_providers() -> Vec<String> {
    vec!["tavily".into(), "brave".into()]
}
fn default_tavily_key_env() -> String {
    "TAVILY_API_KEY".into()
}
fn default_brave_key_env() -> String {
    "BRAVE_SEARCH_API_KEY".into()
}
fn default_max_results() -> u32 {
    3
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_attempt_timeout() -> u64 {
    20
}
fn default_fallback_max_results() -> u32 {
    1
}

/// `[feeds]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedsConfig {
    /// Feed URLs polled on every discovery run.
    #[serde(default = "default_feed_urls")]
    pub urls: Vec<String>,

    /// Maximum entries taken from each feed.
    #[serde(default = "default_limit_per_feed")]
    pub limit_per_feed: usize,

    /// Stamp feed candidates with the `RSS` kind (otherwise left absent).
    #[serde(default = "default_true")]
    pub stamp_kind: bool,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            urls: default_feed_urls(),
            limit_per_feed: default_limit_per_feed(),
            stamp_kind: true,
        }
    }
}

fn default_feed_urls() -> Vec<String> {
    vec!["https://minciencias.gov.co/convocatorias/todas/rss.xml".into()]
}
fn default_limit_per_feed() -> usize {
    5
}
fn default_true() -> bool {
    true
}

/// `[pacing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Minimum ms between classifier calls (4.1s keeps under 15 RPM).
    #[serde(default = "default_filter_delay")]
    pub filter_delay_ms: u64,

    /// Minimum ms between extraction calls.
    #[serde(default = "default_heavy_delay")]
    pub extract_delay_ms: u64,

    /// Minimum ms between enrichment calls.
    #[serde(default = "default_heavy_delay")]
    pub enrich_delay_ms: u64,

    /// Upper bound on one per-item unit of work in a sequential stage.
    #[serde(default = "default_item_timeout")]
    pub item_timeout_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            filter_delay_ms: default_filter_delay(),
            extract_delay_ms: default_heavy_delay(),
            enrich_delay_ms: default_heavy_delay(),
            item_timeout_secs: default_item_timeout(),
        }
    }
}

fn default_filter_delay() -> u64 {
    4_100
}
fn default_heavy_delay() -> u64 {
    2_000
}
fn default_item_timeout() -> u64 {
    180
}

/// `[filter]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Attempt ceiling for one classifier call.
    #[serde(default = "default_classifier_attempts")]
    pub classifier_attempts: u32,

    /// Candidates classified at once. `1` is strict sequencing.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            classifier_attempts: default_classifier_attempts(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_classifier_attempts() -> u32 {
    4
}
fn default_concurrency() -> usize {
    1
}

/// `[limits]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_extract_max_chars")]
    pub extract_max_chars: usize,

    #[serde(default = "default_enrich_max_chars")]
    pub enrich_max_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            extract_max_chars: default_extract_max_chars(),
            enrich_max_chars: default_enrich_max_chars(),
        }
    }
}

fn default_extract_max_chars() -> usize {
    10_000
}
fn default_enrich_max_chars() -> usize {
    15_000
}

/// `[output]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Discovery checkpoint written before enrichment.
    #[serde(default = "default_checkpoint_file")]
    pub checkpoint_file: String,

    /// Final flattened, enriched output.
    #[serde(default = "default_final_file")]
    pub final_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            checkpoint_file: default_checkpoint_file(),
            final_file: default_final_file(),
        }
    }
}

fn default_checkpoint_file() -> String {
    "preliminary_results.json".into()
}
fn default_final_file() -> String {
    "enriched_results.json".into()
}

// ---------------------------------------------------------------------------
// Runtime config (derived once, threaded into every component)
// ---------------------------------------------------------------------------

/// Model and sampling temperature for one inference stage.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelChoice {
    pub model: String,
    pub temperature: f32,
}

/// Bounded retry with exponential backoff and jitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempt ceiling, first try included. Never below 1.
    pub max_attempts: u32,
    /// Backoff before the second attempt; doubles afterwards.
    pub base_delay: Duration,
    /// Cap applied to the exponential part of the backoff.
    pub max_delay: Duration,
    /// Per-attempt timeout, if any.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    /// Exponential backoff before attempt `attempt + 1` (0-based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runtime pipeline configuration, built once from [`AppConfig`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub query_model: ModelChoice,
    pub classifier_model: ModelChoice,
    pub extractor_model: ModelChoice,
    pub enricher_model: ModelChoice,
    pub search_max_results: u32,
    pub fallback_max_results: u32,
    pub search_retry: RetryPolicy,
    pub classifier_retry: RetryPolicy,
    pub filter_concurrency: usize,
    pub feed_urls: Vec<String>,
    pub feed_limit: usize,
    pub feed_stamp_kind: bool,
    pub filter_delay: Duration,
    pub extract_delay: Duration,
    pub enrich_delay: Duration,
    pub item_timeout: Duration,
    pub extract_max_chars: usize,
    pub enrich_max_chars: usize,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        let llm = &config.llm;
        let search = &config.search;
        Self {
            query_model: ModelChoice {
                model: llm.query_model.clone(),
                temperature: llm.query_temperature,
            },
            classifier_model: ModelChoice {
                model: llm.classifier_model.clone(),
                temperature: llm.classifier_temperature,
            },
            extractor_model: ModelChoice {
                model: llm.extractor_model.clone(),
                temperature: llm.extractor_temperature,
            },
            enricher_model: ModelChoice {
                model: llm.enricher_model.clone(),
                temperature: llm.enricher_temperature,
            },
            search_max_results: search.max_results,
            fallback_max_results: search.fallback_max_results,
            search_retry: RetryPolicy {
                max_attempts: search.max_attempts.max(1),
                base_delay: Duration::from_millis(search.backoff_base_ms),
                max_delay: Duration::from_millis(search.backoff_max_ms),
                attempt_timeout: Some(Duration::from_secs(search.attempt_timeout_secs)),
            },
            classifier_retry: RetryPolicy {
                max_attempts: config.filter.classifier_attempts.max(1),
                base_delay: Duration::from_millis(search.backoff_base_ms),
                max_delay: Duration::from_millis(search.backoff_max_ms),
                attempt_timeout: None,
            },
            filter_concurrency: config.filter.concurrency.max(1),
            feed_urls: config.feeds.urls.clone(),
            feed_limit: config.feeds.limit_per_feed,
            feed_stamp_kind: config.feeds.stamp_kind,
            filter_delay: Duration::from_millis(config.pacing.filter_delay_ms),
            extract_delay: Duration::from_millis(config.pacing.extract_delay_ms),
            enrich_delay: Duration::from_millis(config.pacing.enrich_delay_ms),
            item_timeout: Duration::from_secs(config.pacing.item_timeout_secs),
            extract_max_chars: config.limits.extract_max_chars,
            enrich_max_chars: config.limits.enrich_max_chars,
        }
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// API keys resolved from the environment at startup.
#[derive(Clone)]
pub struct Credentials {
    pub llm_api_key: String,
    pub tavily_api_key: Option<String>,
    pub brave_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("llm_api_key", &"<redacted>")
            .field("tavily_api_key", &self.tavily_api_key.as_ref().map(|_| "<redacted>"))
            .field("brave_api_key", &self.brave_api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Read API keys from the environment variables named in `config`.
///
/// The LLM key is required. A configured search provider without a key is
/// disabled with a warning; if that leaves no provider and no feed, the
/// configuration cannot discover anything and is rejected.
pub fn resolve_credentials(config: &AppConfig) -> Result<Credentials> {
    let llm_var = &config.llm.api_key_env;
    let llm_api_key = read_env(llm_var).ok_or_else(|| {
        GrantScoutError::config(format!(
            "LLM API key not found. Set the {llm_var} environment variable."
        ))
    })?;

    let wants = |name: &str| {
        config
            .search
            .providers
            .iter()
            .any(|p| p.eq_ignore_ascii_case(name))
    };

    let tavily_api_key = if wants("tavily") {
        optional_key("tavily", &config.search.tavily_api_key_env)
    } else {
        None
    };
    let brave_api_key = if wants("brave") {
        optional_key("brave", &config.search.brave_api_key_env)
    } else {
        None
    };

    if tavily_api_key.is_none() && brave_api_key.is_none() && config.feeds.urls.is_empty() {
        return Err(GrantScoutError::config(
            "no search provider has an API key and no feeds are configured",
        ));
    }

    Ok(Credentials {
        llm_api_key,
        tavily_api_key,
        brave_api_key,
    })
}

fn read_env(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(val) if !val.trim().is_empty() => Some(val),
        _ => None,
    }
}

fn optional_key(provider: &str, var: &str) -> Option<String> {
    let key = read_env(var);
    if key.is_none() {
        tracing::warn!(provider, env = var, "search provider disabled: API key not set");
    }
    key
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.grantscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GrantScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.grantscout/grantscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GrantScoutError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        GrantScoutError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GrantScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GrantScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GrantScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("filter_delay_ms"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("minciencias"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[pacing]
filter_delay_ms = 1000

[feeds]
urls = []
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.pacing.filter_delay_ms, 1000);
        assert_eq!(config.pacing.extract_delay_ms, 2000);
        assert!(config.feeds.urls.is_empty());
        assert_eq!(config.feeds.limit_per_feed, 5);
        assert_eq!(config.search.providers, vec!["tavily", "brave"]);
    }

    #[test]
    fn pipeline_config_from_app_config() {
        let app = AppConfig::default();
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.filter_delay, Duration::from_millis(4100));
        assert_eq!(pipeline.search_retry.max_attempts, 3);
        assert_eq!(pipeline.classifier_retry.max_attempts, 4);
        assert_eq!(pipeline.filter_concurrency, 1);
        assert_eq!(pipeline.extract_max_chars, 10_000);
        assert_eq!(pipeline.enrich_max_chars, 15_000);
        assert_eq!(pipeline.extractor_model.temperature, 0.0);
    }

    #[test]
    fn zero_attempts_are_clamped() {
        let mut app = AppConfig::default();
        app.search.max_attempts = 0;
        app.filter.concurrency = 0;
        let pipeline = PipelineConfig::from(&app);
        assert_eq!(pipeline.search_retry.max_attempts, 1);
        assert_eq!(pipeline.filter_concurrency, 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_millis(1500),
            attempt_timeout: None,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(1), Duration::from_millis(1000));
        assert_eq!(policy.backoff(2), Duration::from_millis(1500));
        assert_eq!(policy.backoff(30), Duration::from_millis(1500));
    }

    #[test]
    fn missing_llm_key_is_a_config_error() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.llm.api_key_env = "GS_TEST_NONEXISTENT_KEY_12345".into();
        let err = resolve_credentials(&config).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains("GS_TEST_NONEXISTENT_KEY_12345"));
    }

    #[test]
    fn credentials_debug_redacts_keys() {
        let creds = Credentials {
            llm_api_key: "sk-secret".into(),
            tavily_api_key: Some("tvly-secret".into()),
            brave_api_key: None,
        };
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret"));
    }
}
