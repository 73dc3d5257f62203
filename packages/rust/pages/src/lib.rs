//! Page-fetch collaborator: download a page and reduce it to readable text.
//!
//! HTML is narrowed to its main content container, converted to Markdown with
//! `htmd`, then run through the cleanup passes in [`cleanup`]. Plain-text
//! responses pass through untouched.

mod cleanup;

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use grantscout_shared::{GrantScoutError, Result};

/// Maximum number of redirects followed for a page.
const MAX_REDIRECTS: usize = 5;

/// Maximum response size we are willing to convert (10 MB).
const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// User-Agent string for page requests.
const USER_AGENT: &str = concat!("GrantScout/", env!("CARGO_PKG_VERSION"));

/// Tags whose content is never useful to the model.
const SKIP_TAGS: [&str; 11] = [
    "script", "style", "nav", "header", "footer", "aside", "iframe", "noscript", "svg", "form",
    "button",
];

/// Fetch the readable text of a page.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String>;
}

/// [`PageFetcher`] over HTTP.
pub struct HttpPageFetcher {
    http: Client,
}

impl HttpPageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(timeout)
            .build()
            .map_err(|e| GrantScoutError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    #[instrument(skip_all, fields(%url))]
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| GrantScoutError::fetch(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GrantScoutError::fetch(url, format!("HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(GrantScoutError::fetch(
                    url,
                    format!("response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"),
                ));
            }
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| GrantScoutError::fetch(url, format!("failed to read body: {e}")))?;

        let text = if content_type.starts_with("text/plain") {
            body.trim().to_string()
        } else if content_type.contains("html") || content_type.contains("xml") {
            html_to_text(&body, url)?
        } else {
            return Err(GrantScoutError::fetch(
                url,
                format!("unsupported content type: {content_type}"),
            ));
        };

        if text.is_empty() {
            return Err(GrantScoutError::fetch(url, "page has no readable text"));
        }

        debug!(chars = text.chars().count(), "page text ready");
        Ok(text)
    }
}

/// Convert an HTML page to cleaned Markdown-flavoured text.
pub fn html_to_text(html: &str, source_url: &str) -> Result<String> {
    let content_html = extract_content_html(html);
    let content_html = flatten_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let markdown = converter
        .convert(&content_html)
        .map_err(|e| GrantScoutError::fetch(source_url, format!("HTML conversion failed: {e}")))?;

    let base_url = Url::parse(source_url).ok();
    Ok(cleanup::run_pipeline(&markdown, base_url.as_ref()))
}

/// Truncate to at most `max_chars` characters, never splitting a character.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Narrow the document to its main content container, falling back to `<body>`.
fn extract_content_html(html: &str) -> String {
    let doc = Html::parse_document(html);

    // Known content containers, most specific first (Drupal and WordPress
    // cover most government and foundation sites).
    let selectors = [
        "[role=\"main\"]",
        "main",
        "article",
        "#main-content",
        "#content",
        ".region-content",
        ".entry-content",
        ".content",
        "body",
    ];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                return el.inner_html();
            }
        }
    }

    html.to_string()
}

/// Replace `<table>` elements with one `a | b | c` paragraph per row.
///
/// Calendars of dates and amounts are usually tables; `htmd` would otherwise
/// run their cells together.
fn flatten_tables(html: &str) -> String {
    static TABLE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?is)<table\b.*?</table>").expect("valid regex"));

    TABLE_RE
        .replace_all(html, |caps: &regex::Captures| table_rows(&caps[0]))
        .to_string()
}

fn table_rows(table_html: &str) -> String {
    let (Ok(row_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return table_html.to_string();
    };

    let fragment = Html::parse_fragment(table_html);
    fragment
        .select(&row_sel)
        .map(|tr| {
            tr.select(&cell_sel)
                .map(|cell| cell.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" "))
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .filter(|row| !row.is_empty())
        .map(|row| format!("<p>{row}</p>"))
        .collect()
}
