//! Typed per-item outcomes for the sequential stages.

use std::fmt;

use serde::Serialize;

/// Why an item was dropped from a stage's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The relevance classifier failed after its retries.
    Classifier,
    /// Opportunity extraction failed for the source.
    Extraction,
    /// Refinement failed for the opportunity.
    Enrichment,
    /// The opportunity reached enrichment without an id.
    MissingId,
    /// The opportunity reached enrichment without a kind.
    MissingKind,
    /// The per-item time budget ran out.
    Timeout,
    /// A checkpoint entry could not be read as an opportunity.
    InvalidRecord,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Extraction => "extraction",
            Self::Enrichment => "enrichment",
            Self::MissingId => "missing_id",
            Self::MissingKind => "missing_kind",
            Self::Timeout => "timeout",
            Self::InvalidRecord => "invalid_record",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item a stage could not process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedItem {
    /// Position of the item in the stage input.
    pub index: usize,
    /// Short human label (title, url or origin).
    pub label: String,
    pub reason: SkipReason,
    pub detail: String,
}

impl SkippedItem {
    pub fn new(index: usize, label: impl Into<String>, reason: SkipReason, detail: impl ToString) -> Self {
        Self {
            index,
            label: label.into(),
            reason,
            detail: detail.to_string(),
        }
    }
}

/// Output of one stage: kept items in input order, plus what was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport<T> {
    pub items: Vec<T>,
    pub skipped: Vec<SkippedItem>,
    /// Items dropped by a legitimate negative decision (not failures).
    pub rejected: usize,
}

impl<T> Default for StageReport<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            skipped: Vec::new(),
            rejected: 0,
        }
    }
}

impl<T> StageReport<T> {
    pub fn count_skipped(&self, reason: SkipReason) -> usize {
        self.skipped.iter().filter(|s| s.reason == reason).count()
    }
}

/// Result of processing one item inside a stage.
#[derive(Debug)]
pub(crate) enum ItemOutcome<T> {
    Kept(T),
    Rejected,
    Skipped(SkippedItem),
}

impl<T> StageReport<T> {
    /// Fold outcomes in order. `Kept` values are appended as-is.
    pub(crate) fn from_outcomes<I>(outcomes: I) -> Self
    where
        I: IntoIterator<Item = ItemOutcome<Vec<T>>>,
    {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Kept(items) => report.items.extend(items),
                ItemOutcome::Rejected => report.rejected += 1,
                ItemOutcome::Skipped(skip) => report.skipped.push(skip),
            }
        }
        report
    }
}
