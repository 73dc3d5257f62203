//! Extraction: turn each relevant source's page into funding opportunities.

use std::sync::Arc;
use std::time::Duration;

use grantscout_inference::{InferenceRequest, StructuredInference, infer_as};
use grantscout_pages::{PageFetcher, truncate_chars};
use grantscout_shared::{
    CandidateSource, FundingOpportunity, FundingOpportunityBatch, ModelChoice, PipelineConfig,
    Result,
};
use tracing::{debug, info, instrument, warn};

use crate::pacing::{Clock, Pacer};
use crate::pipeline::ProgressReporter;
use crate::prompts::{self, CONTENT_UNAVAILABLE};
use crate::report::{ItemOutcome, SkipReason, SkippedItem, StageReport};

pub struct Extractor {
    inference: Arc<dyn StructuredInference>,
    pages: Arc<dyn PageFetcher>,
    pacer: Pacer,
    model: ModelChoice,
    item_timeout: Duration,
    max_chars: usize,
}

impl Extractor {
    pub fn new(
        inference: Arc<dyn StructuredInference>,
        pages: Arc<dyn PageFetcher>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            inference,
            pages,
            pacer: Pacer::new(clock, config.extract_delay),
            model: config.extractor_model.clone(),
            item_timeout: config.item_timeout,
            max_chars: config.extract_max_chars,
        }
    }

    /// Extract opportunities from each source in turn.
    ///
    /// The result is flat: every opportunity of source 1, then of source 2,
    /// and so on. Each carries its source's kind and no id.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn run(
        &self,
        sources: Vec<CandidateSource>,
        progress: &dyn ProgressReporter,
    ) -> StageReport<FundingOpportunity> {
        let total = sources.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, source) in sources.into_iter().enumerate() {
            self.pacer.wait().await;
            progress.item(index + 1, total, source.label());

            let outcome = match tokio::time::timeout(self.item_timeout, self.extract(&source)).await {
                Ok(Ok(opportunities)) => {
                    info!(title = %source.label(), found = opportunities.len(), "opportunities extracted");
                    ItemOutcome::Kept(opportunities)
                }
                Ok(Err(e)) => self.skip(index, &source, SkipReason::Extraction, e.to_string(), progress),
                Err(_) => self.skip(
                    index,
                    &source,
                    SkipReason::Timeout,
                    format!("no extraction within {}s", self.item_timeout.as_secs()),
                    progress,
                ),
            };
            outcomes.push(outcome);
        }

        let report = StageReport::from_outcomes(outcomes);
        info!(
            extracted = report.items.len(),
            skipped = report.skipped.len(),
            "extraction complete"
        );
        report
    }

    async fn extract(&self, source: &CandidateSource) -> Result<Vec<FundingOpportunity>> {
        let page_text = self.page_text(source).await;

        let request = InferenceRequest::for_output::<FundingOpportunityBatch>(
            "extract",
            &self.model,
            prompts::EXTRACTOR_SYSTEM,
            prompts::extractor_user(source.url.as_deref(), &page_text),
        );
        let batch: FundingOpportunityBatch = infer_as(self.inference.as_ref(), request).await?;

        Ok(batch
            .opportunities
            .into_iter()
            .map(|mut opportunity| {
                opportunity.sanitize();
                opportunity.id = None;
                opportunity.kind = source.kind;
                opportunity
            })
            .collect())
    }

    /// Page text bounded to the extraction ceiling, or the placeholder.
    async fn page_text(&self, source: &CandidateSource) -> String {
        let Some(url) = source.url.as_deref() else {
            debug!(title = %source.label(), "source has no url");
            return CONTENT_UNAVAILABLE.to_string();
        };

        match self.pages.fetch_text(url).await {
            Ok(text) => truncate_chars(&text, self.max_chars).to_string(),
            Err(e) => {
                warn!(%url, error = %e, "page fetch failed, extracting from placeholder");
                CONTENT_UNAVAILABLE.to_string()
            }
        }
    }

    fn skip(
        &self,
        index: usize,
        source: &CandidateSource,
        reason: SkipReason,
        detail: String,
        progress: &dyn ProgressReporter,
    ) -> ItemOutcome<Vec<FundingOpportunity>> {
        let skip = SkippedItem::new(index, source.label(), reason, detail);
        warn!(
            title = %skip.label,
            url = source.url.as_deref().unwrap_or(""),
            %reason,
            error = %skip.detail,
            "extraction failed, skipping"
        );
        progress.item_skipped(&skip);
        ItemOutcome::Skipped(skip)
    }
}
