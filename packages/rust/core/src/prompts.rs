//! Prompt text for every inference task.

use grantscout_shared::{CandidateSource, FundingOpportunity, ProjectBrief};

pub(crate) const QUERY_SYSTEM: &str = "\
You are a research assistant who finds funding for projects. Given a project \
brief, propose five distinct search ideas. For each idea write one query in \
English aimed at international funders (foundations, multilateral agencies, \
international calls) and one query in Spanish aimed at national funders \
(ministries, regional governments, national agencies). Queries must be short \
and specific enough to surface open calls, grants, prizes or subsidies.";

pub(crate) const CLASSIFIER_SYSTEM: &str = "\
You decide whether a search result is a direct funding source. A direct \
funding source is an open call, a grant or scholarship page, a prize, a \
subsidy or an investment programme that a project could apply to. News \
articles, blog posts, directories or lists of funders, academic papers and \
generic institutional pages are NOT direct funding sources. Answer with \
is_relevant and a one-sentence reason.";

pub(crate) const EXTRACTOR_SYSTEM: &str = "\
You extract funding opportunities from web page text. Return every distinct \
opportunity the page describes; return an empty list when there is none. Use \
only information present in the text. application_deadline must be a date in \
YYYY-MM-DD format, or null when the page does not state one; never guess a \
date. opportunity_url is the most direct link to the call itself. Leave id and \
type null.";

pub(crate) const ENRICHER_SYSTEM: &str = "\
You verify and complete a funding opportunity record using the text of its \
official page. Correct fields the page contradicts, fill fields the page \
states, and keep fields the page does not mention unchanged. \
application_deadline must be a date in YYYY-MM-DD format, or null when the \
page does not state one; never guess a date. Return the single refined \
record.";

/// Placeholder fed to extraction when the page cannot be fetched.
pub const CONTENT_UNAVAILABLE: &str = "content unavailable";

/// Placeholder fed to refinement when the page fetch fails.
pub const ENRICH_FETCH_FAILED: &str = "Error loading page content.";

/// Placeholder fed to refinement when no URL is known.
pub const ENRICH_NO_URL: &str = "No URL could be found to scrape.";

pub(crate) fn query_user(brief: &ProjectBrief) -> String {
    brief.render()
}

pub(crate) fn classifier_user(candidate: &CandidateSource) -> String {
    format!(
        "Title: {}\nURL: {}\nDescription: {}",
        candidate.title,
        candidate.url.as_deref().unwrap_or("(none)"),
        candidate.description.as_deref().unwrap_or("(none)"),
    )
}

pub(crate) fn extractor_user(url: Option<&str>, page_text: &str) -> String {
    format!(
        "Source URL: {}\n\nPage content:\n{page_text}",
        url.unwrap_or("(none)")
    )
}

pub(crate) fn enricher_user(opportunity: &FundingOpportunity, page_text: &str) -> String {
    let record = serde_json::to_string_pretty(opportunity).unwrap_or_default();
    format!("Current record:\n{record}\n\nPage content:\n{page_text}")
}

/// Query used to look for an official page when a record has no URL.
pub(crate) fn fallback_url_query(opportunity: &FundingOpportunity) -> String {
    let description: String = opportunity.description.chars().take(100).collect();
    format!(
        "funding opportunity official page {} {}",
        opportunity.origin, description
    )
}
