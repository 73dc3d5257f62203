//! End-to-end runs: brief → queries → retrieval → filter → extraction →
//! checkpoint → enrichment → output file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use grantscout_inference::StructuredInference;
use grantscout_pages::PageFetcher;
use grantscout_retrieval::{Retriever, SearchProvider, flatten_queries};
use grantscout_shared::{FundingOpportunity, PipelineConfig, ProjectBrief, Result};
use tracing::{info, instrument};

use crate::checkpoint::{assign_ids, assign_missing_ids, load_checkpoint, save_checkpoint, write_json_atomic};
use crate::enricher::Enricher;
use crate::expander::expand_queries;
use crate::extractor::Extractor;
use crate::filter::RelevanceFilter;
use crate::flatten::{OpportunityOutput, flatten_opportunities};
use crate::pacing::Clock;
use crate::report::{SkipReason, SkippedItem};

/// Counts and paths describing one finished run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    /// Flat queries sent to the search providers.
    pub queries: usize,
    /// Candidate sources from web search and feeds.
    pub candidates: usize,
    /// Candidates the classifier kept.
    pub relevant: usize,
    pub extracted: usize,
    pub enriched: usize,
    /// Every per-item failure, across stages, in the order it happened.
    pub skipped: Vec<SkippedItem>,
    pub checkpoint_path: Option<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Skip counts grouped by reason, in order of first occurrence.
    pub fn skip_counts(&self) -> Vec<(SkipReason, usize)> {
        let mut counts: Vec<(SkipReason, usize)> = Vec::new();
        for skip in &self.skipped {
            match counts.iter_mut().find(|(reason, _)| *reason == skip.reason) {
                Some((_, n)) => *n += 1,
                None => counts.push((skip.reason, 1)),
            }
        }
        counts
    }
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called before each item of a per-item stage is processed.
    fn item(&self, current: usize, total: usize, label: &str);
    /// Called when an item is dropped because it failed.
    fn item_skipped(&self, skip: &SkippedItem);
    /// Called when the run completes.
    fn done(&self, summary: &RunSummary);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item(&self, _current: usize, _total: usize, _label: &str) {}
    fn item_skipped(&self, _skip: &SkippedItem) {}
    fn done(&self, _summary: &RunSummary) {}
}

/// External collaborators a pipeline runs against.
pub struct PipelineDeps {
    pub inference: Arc<dyn StructuredInference>,
    pub retriever: Retriever,
    pub pages: Arc<dyn PageFetcher>,
    /// Provider for the enricher's missing-URL search, if any.
    pub fallback_search: Option<Arc<dyn SearchProvider>>,
    pub clock: Arc<dyn Clock>,
}

pub struct Pipeline {
    config: PipelineConfig,
    inference: Arc<dyn StructuredInference>,
    retriever: Retriever,
    filter: RelevanceFilter,
    extractor: Extractor,
    enricher: Enricher,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Self {
        let filter = RelevanceFilter::new(deps.inference.clone(), deps.clock.clone(), &config);
        let extractor = Extractor::new(
            deps.inference.clone(),
            deps.pages.clone(),
            deps.clock.clone(),
            &config,
        );
        let enricher = Enricher::new(
            deps.inference.clone(),
            deps.pages,
            deps.fallback_search,
            deps.clock,
            &config,
        );

        Self {
            config,
            inference: deps.inference,
            retriever: deps.retriever,
            filter,
            extractor,
            enricher,
        }
    }

    /// Discovery up to extraction. Opportunities come back without ids.
    ///
    /// Only query generation can fail the run; every later stage absorbs its
    /// failures per item.
    pub async fn discover(
        &self,
        brief: &ProjectBrief,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<FundingOpportunity>> {
        progress.phase("Generating queries");
        let pairs = expand_queries(self.inference.as_ref(), &self.config.query_model, brief).await?;
        let queries = flatten_queries(&pairs);
        summary.queries = queries.len();

        progress.phase("Researching (web + RSS)");
        let candidates = self.retriever.retrieve(&queries).await;
        summary.candidates = candidates.len();

        progress.phase("Scrutinizing");
        let relevant = self.filter.run(candidates, progress).await;
        summary.relevant = relevant.items.len();
        summary.skipped.extend(relevant.skipped);

        progress.phase("Extracting");
        let extracted = self.extractor.run(relevant.items, progress).await;
        summary.extracted = extracted.items.len();
        summary.skipped.extend(extracted.skipped);

        info!(
            queries = summary.queries,
            candidates = summary.candidates,
            relevant = summary.relevant,
            extracted = summary.extracted,
            "discovery complete"
        );
        Ok(extracted.items)
    }

    /// Enrich opportunities that already carry ids and kinds.
    pub async fn enrich(
        &self,
        opportunities: Vec<FundingOpportunity>,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Vec<FundingOpportunity> {
        progress.phase("Enriching");
        let report = self.enricher.run(opportunities, progress).await;
        summary.enriched = report.items.len();
        summary.skipped.extend(report.skipped);
        report.items
    }

    /// Discovery, then ids, then the checkpoint file.
    #[instrument(skip_all, fields(title = %brief.title, checkpoint = %checkpoint.display()))]
    pub async fn run_discovery(
        &self,
        brief: &ProjectBrief,
        checkpoint: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        self.discover_and_checkpoint(brief, checkpoint, &mut summary, progress)
            .await?;

        Ok(self.finish(summary, start, progress))
    }

    /// Discovery, checkpoint, enrichment and the final output file.
    #[instrument(skip_all, fields(title = %brief.title, output = %output.display()))]
    pub async fn run_full(
        &self,
        brief: &ProjectBrief,
        checkpoint: &Path,
        output: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        let opportunities = self
            .discover_and_checkpoint(brief, checkpoint, &mut summary, progress)
            .await?;
        let enriched = self.enrich(opportunities, &mut summary, progress).await;
        self.write_output(enriched, output, &mut summary, progress)?;

        Ok(self.finish(summary, start, progress))
    }

    /// Enrich a previously written checkpoint.
    ///
    /// Records that lack an id get a fresh one; existing ids are kept.
    #[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
    pub async fn run_enrich_only(
        &self,
        input: &Path,
        output: &Path,
        progress: &dyn ProgressReporter,
    ) -> Result<RunSummary> {
        let start = Instant::now();
        let mut summary = RunSummary::default();

        progress.phase("Checkpoint");
        let loaded = load_checkpoint(input)?;
        for skip in &loaded.skipped {
            progress.item_skipped(skip);
        }
        summary.skipped.extend(loaded.skipped);
        let mut opportunities = loaded.opportunities;
        let minted = assign_missing_ids(&mut opportunities);
        info!(records = opportunities.len(), minted, "checkpoint loaded");
        summary.extracted = opportunities.len();

        let enriched = self.enrich(opportunities, &mut summary, progress).await;
        self.write_output(enriched, output, &mut summary, progress)?;

        Ok(self.finish(summary, start, progress))
    }

    async fn discover_and_checkpoint(
        &self,
        brief: &ProjectBrief,
        checkpoint: &Path,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<FundingOpportunity>> {
        let mut opportunities = self.discover(brief, summary, progress).await?;

        progress.phase("Checkpoint");
        assign_ids(&mut opportunities);
        save_checkpoint(checkpoint, &opportunities)?;
        summary.checkpoint_path = Some(checkpoint.to_path_buf());
        Ok(opportunities)
    }

    fn write_output(
        &self,
        enriched: Vec<FundingOpportunity>,
        output: &Path,
        summary: &mut RunSummary,
        progress: &dyn ProgressReporter,
    ) -> Result<()> {
        progress.phase("Formatting output");
        let flat = flatten_opportunities(enriched.into_iter().map(OpportunityOutput::from));
        write_json_atomic(output, &flat)?;
        info!(path = %output.display(), records = flat.len(), "output written");
        summary.output_path = Some(output.to_path_buf());
        Ok(())
    }

    fn finish(&self, mut summary: RunSummary, start: Instant, progress: &dyn ProgressReporter) -> RunSummary {
        summary.elapsed = start.elapsed();
        progress.done(&summary);
        info!(
            enriched = summary.enriched,
            skipped = summary.skipped.len(),
            elapsed_ms = summary.elapsed.as_millis(),
            "run complete"
        );
        summary
    }
}
