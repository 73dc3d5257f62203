//! Core domain types for the funding-opportunity pipeline.

use std::fmt;

use chrono::NaiveDate;
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OpportunityKind
// ---------------------------------------------------------------------------

/// Whether a source or opportunity is national or international in scope.
///
/// Feed entries may additionally be stamped `RSS` when the feed poller is
/// configured to mark them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum OpportunityKind {
    #[serde(alias = "national", alias = "NATIONAL")]
    National,
    #[serde(alias = "international", alias = "INTERNATIONAL")]
    International,
    #[serde(rename = "RSS", alias = "rss", alias = "Rss")]
    Rss,
}

impl OpportunityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::National => "National",
            Self::International => "International",
            Self::Rss => "RSS",
        }
    }
}

impl fmt::Display for OpportunityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Project brief and queries
// ---------------------------------------------------------------------------

/// Free-text description of the project we are searching funding for.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl ProjectBrief {
    /// Render the brief as the user content of the query-expansion call.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Project title: {}\nDescription: {}",
            self.title.trim(),
            self.description.trim()
        );
        if !self.keywords.is_empty() {
            out.push_str("\nKeywords: ");
            out.push_str(&self.keywords.join(", "));
        }
        out
    }
}

/// One expansion idea with its international (English) and national query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SearchQueryPair {
    /// The idea or angle behind the search.
    pub idea: String,
    /// Query for international opportunities, in English.
    pub international_query: String,
    /// Query for national opportunities, in the local language.
    pub national_query: String,
}

/// Structured output of the query-expansion call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct QueryList {
    /// The generated query pairs (nominally five).
    pub queries: Vec<SearchQueryPair>,
}

/// A single search query tagged with the scope it targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatQuery {
    pub query: String,
    #[serde(rename = "type")]
    pub kind: OpportunityKind,
}

// ---------------------------------------------------------------------------
// Candidate sources
// ---------------------------------------------------------------------------

/// A search or feed hit that has not been judged relevant yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OpportunityKind>,
}

impl CandidateSource {
    /// Short label for logs and progress output.
    pub fn label(&self) -> &str {
        if self.title.is_empty() {
            self.url.as_deref().unwrap_or("<untitled>")
        } else {
            &self.title
        }
    }
}

/// Classifier output for one candidate source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScrutinyVerdict {
    /// True when the source is a direct funding source (call, grant page, prize);
    /// false for news, blogs, directories or academic papers.
    pub is_relevant: bool,
    /// Short justification.
    #[serde(default)]
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// OpportunityId
// ---------------------------------------------------------------------------

/// Stable identifier attached to every discovered opportunity.
///
/// Freshly minted ids are random UUIDs; ids loaded from a checkpoint are kept
/// verbatim, whatever their format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct OpportunityId(pub String);

impl OpportunityId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OpportunityId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OpportunityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OpportunityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ---------------------------------------------------------------------------
// FundingOpportunity
// ---------------------------------------------------------------------------

/// A structured record describing one grant or funding offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FundingOpportunity {
    /// Unique identifier, assigned after discovery.
    #[serde(default)]
    pub id: Option<OpportunityId>,
    /// National or international scope, propagated from the source.
    #[serde(rename = "type", default)]
    pub kind: Option<OpportunityKind>,
    /// Organization or call offering the funding.
    pub origin: String,
    /// Concise summary of the opportunity.
    pub description: String,
    /// Kind of financing (grant, investment, subsidy...).
    #[serde(default)]
    pub financing_type: Option<String>,
    /// Main requirements to apply.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Vec<String>")]
    pub main_requirements: Vec<String>,
    /// Application deadline in YYYY-MM-DD format, when stated.
    #[serde(default)]
    pub application_deadline: Option<String>,
    /// Direct link to the call's page.
    #[serde(default)]
    pub opportunity_url: Option<String>,
}

impl FundingOpportunity {
    /// Normalize model output in place.
    ///
    /// Blank optional strings become absent, and a deadline that is not an
    /// ISO `YYYY-MM-DD` date is dropped rather than guessed.
    pub fn sanitize(&mut self) {
        self.origin = self.origin.trim().to_string();
        self.description = self.description.trim().to_string();
        blank_to_none(&mut self.financing_type);
        blank_to_none(&mut self.opportunity_url);
        blank_to_none(&mut self.application_deadline);

        if let Some(deadline) = self.application_deadline.take() {
            match NaiveDate::parse_from_str(&deadline, "%Y-%m-%d") {
                Ok(date) => self.application_deadline = Some(date.format("%Y-%m-%d").to_string()),
                Err(_) => {
                    tracing::debug!(origin = %self.origin, %deadline, "dropping non-ISO deadline");
                }
            }
        }

        self.main_requirements.retain(|r| !r.trim().is_empty());
    }

    /// Short label for logs and progress output, at most 40 characters.
    pub fn label(&self) -> String {
        self.origin.chars().take(40).collect()
    }
}

/// Structured output of the extraction call: zero or more opportunities.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct FundingOpportunityBatch {
    /// Every funding opportunity found on the page; may be empty.
    #[serde(default, deserialize_with = "null_as_empty")]
    #[schemars(with = "Vec<FundingOpportunity>")]
    pub opportunities: Vec<FundingOpportunity>,
}

fn blank_to_none(field: &mut Option<String>) {
    if let Some(value) = field.take() {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *field = Some(trimmed.to_string());
        }
    }
}

fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}
