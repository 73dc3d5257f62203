//! Relevance filter: keep only candidates the classifier calls direct funding
//! sources.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use grantscout_inference::{InferenceRequest, StructuredInference, infer_as};
use grantscout_shared::{
    CandidateSource, ModelChoice, PipelineConfig, Result, RetryPolicy, ScrutinyVerdict,
};
use tracing::{debug, info, instrument, warn};

use crate::pacing::{Clock, Pacer};
use crate::pipeline::ProgressReporter;
use crate::prompts;
use crate::report::{ItemOutcome, SkipReason, SkippedItem, StageReport};

pub struct RelevanceFilter {
    inference: Arc<dyn StructuredInference>,
    clock: Arc<dyn Clock>,
    pacer: Pacer,
    model: ModelChoice,
    retry: RetryPolicy,
    item_timeout: Duration,
    concurrency: usize,
}

impl RelevanceFilter {
    pub fn new(
        inference: Arc<dyn StructuredInference>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            inference,
            pacer: Pacer::new(clock.clone(), config.filter_delay),
            clock,
            model: config.classifier_model.clone(),
            retry: config.classifier_retry.clone(),
            item_timeout: config.item_timeout,
            concurrency: config.filter_concurrency.max(1),
        }
    }

    /// Classify every candidate, keeping the relevant ones in input order.
    ///
    /// With `concurrency == 1` candidates are classified strictly one after
    /// another. Larger values classify that many at once, still admitting
    /// call starts through the pacer and still reporting in input order.
    #[instrument(skip_all, fields(candidates = candidates.len(), concurrency = self.concurrency))]
    pub async fn run(
        &self,
        candidates: Vec<CandidateSource>,
        progress: &dyn ProgressReporter,
    ) -> StageReport<CandidateSource> {
        let total = candidates.len();

        let outcomes: Vec<_> = stream::iter(candidates.into_iter().enumerate())
            .map(|(index, candidate)| self.process(index, total, candidate, progress))
            .buffered(self.concurrency)
            .collect()
            .await;

        let report = StageReport::from_outcomes(outcomes);
        info!(
            relevant = report.items.len(),
            rejected = report.rejected,
            skipped = report.skipped.len(),
            "scrutiny complete"
        );
        report
    }

    async fn process(
        &self,
        index: usize,
        total: usize,
        candidate: CandidateSource,
        progress: &dyn ProgressReporter,
    ) -> ItemOutcome<Vec<CandidateSource>> {
        self.pacer.wait().await;
        progress.item(index + 1, total, candidate.label());

        let outcome = tokio::time::timeout(self.item_timeout, self.classify(&candidate)).await;
        let skip = match outcome {
            Ok(Ok(verdict)) if verdict.is_relevant => {
                info!(title = %candidate.label(), "relevant source kept");
                return ItemOutcome::Kept(vec![candidate]);
            }
            Ok(Ok(verdict)) => {
                debug!(
                    title = %candidate.label(),
                    reason = verdict.reason.as_deref().unwrap_or(""),
                    "source dropped as not relevant"
                );
                return ItemOutcome::Rejected;
            }
            Ok(Err(e)) => SkippedItem::new(index, candidate.label(), SkipReason::Classifier, e),
            Err(_) => SkippedItem::new(
                index,
                candidate.label(),
                SkipReason::Timeout,
                format!("no verdict within {}s", self.item_timeout.as_secs()),
            ),
        };

        warn!(
            title = %skip.label,
            url = candidate.url.as_deref().unwrap_or(""),
            reason = %skip.reason,
            error = %skip.detail,
            "classification failed, skipping"
        );
        progress.item_skipped(&skip);
        ItemOutcome::Skipped(skip)
    }

    /// One classifier call with bounded retry and exponential backoff.
    async fn classify(&self, candidate: &CandidateSource) -> Result<ScrutinyVerdict> {
        let attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            let request = InferenceRequest::for_output::<ScrutinyVerdict>(
                "classify",
                &self.model,
                prompts::CLASSIFIER_SYSTEM,
                prompts::classifier_user(candidate),
            );

            match infer_as(self.inference.as_ref(), request).await {
                Ok(verdict) => return Ok(verdict),
                Err(e) if attempt + 1 < attempts => {
                    let delay = self.retry.backoff(attempt);
                    debug!(attempt = attempt + 1, error = %e, delay_ms = delay.as_millis() as u64, "classifier retry");
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
