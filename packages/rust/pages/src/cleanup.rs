//! Post-conversion cleanup for page text handed to the model.
//!
//! Each pass is a function `&str -> String` applied in sequence. The goal is
//! dense readable text: no images, no layout markup, absolute links.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run every cleanup pass on converted Markdown.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = strip_images(md);
    result = strip_leftover_html(&result);
    result = resolve_links(&result, base_url);
    result = normalize_whitespace(&result);
    result = collapse_blank_lines(&result);
    result.trim().to_string()
}

// ---------------------------------------------------------------------------
// Pass 1: Drop images
// ---------------------------------------------------------------------------

/// Remove `![alt](src)` images, including linked banners.
fn strip_images(md: &str) -> String {
    static IMAGE_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMAGE_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove layout and form tags that survived conversion, keeping their text.
fn strip_leftover_html(md: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|form|label|button|input|select|option|font|center)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(md, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Resolve relative links
// ---------------------------------------------------------------------------

/// Resolve relative link targets against the page URL.
///
/// Application forms and terms documents are usually linked relatively; the
/// model needs absolute URLs to report them.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(md, |caps: &regex::Captures| {
            let text = &caps[1];
            let href = &caps[2];

            let is_absolute = href.starts_with("http://")
                || href.starts_with("https://")
                || href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("tel:");
            if is_absolute {
                return format!("[{text}]({href})");
            }

            match base.join(href) {
                Ok(resolved) => format!("[{text}]({resolved})"),
                Err(_) => format!("[{text}]({href})"),
            }
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace on every line.
fn normalize_whitespace(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// Collapse runs of blank lines into a single blank line.
fn collapse_blank_lines(md: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(md, "\n\n").to_string()
}
