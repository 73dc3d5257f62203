//! Enrichment: refine each discovered opportunity against its official page.

use std::sync::Arc;
use std::time::Duration;

use grantscout_inference::{InferenceRequest, StructuredInference, infer_as};
use grantscout_pages::{PageFetcher, truncate_chars};
use grantscout_retrieval::{SearchProvider, first_result_url};
use grantscout_shared::{FundingOpportunity, ModelChoice, PipelineConfig, Result};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use crate::pacing::{Clock, Pacer};
use crate::pipeline::ProgressReporter;
use crate::prompts::{self, ENRICH_FETCH_FAILED, ENRICH_NO_URL};
use crate::report::{ItemOutcome, SkipReason, SkippedItem, StageReport};

/// Output of the refinement call.
///
/// It has no id or type: those always come from the record being refined,
/// whatever the model puts there.
#[derive(Debug, Deserialize, JsonSchema)]
struct RefinedOpportunity {
    /// Organization or call offering the funding.
    origin: String,
    /// Concise summary of the opportunity.
    description: String,
    /// Kind of financing (grant, investment, subsidy...).
    #[serde(default)]
    financing_type: Option<String>,
    /// Main requirements to apply.
    #[serde(default)]
    main_requirements: Option<Vec<String>>,
    /// Application deadline in YYYY-MM-DD format, when stated.
    #[serde(default)]
    application_deadline: Option<String>,
    /// Direct link to the call's page.
    #[serde(default)]
    opportunity_url: Option<String>,
}

impl RefinedOpportunity {
    fn into_opportunity(self, original: &FundingOpportunity) -> FundingOpportunity {
        FundingOpportunity {
            id: original.id.clone(),
            kind: original.kind,
            origin: self.origin,
            description: self.description,
            financing_type: self.financing_type,
            main_requirements: self.main_requirements.unwrap_or_default(),
            application_deadline: self.application_deadline,
            opportunity_url: self.opportunity_url,
        }
    }
}

pub struct Enricher {
    inference: Arc<dyn StructuredInference>,
    pages: Arc<dyn PageFetcher>,
    search: Option<Arc<dyn SearchProvider>>,
    pacer: Pacer,
    model: ModelChoice,
    item_timeout: Duration,
    max_chars: usize,
    fallback_max_results: u32,
}

impl Enricher {
    /// `search` is used only to look for a page when a record has no URL.
    pub fn new(
        inference: Arc<dyn StructuredInference>,
        pages: Arc<dyn PageFetcher>,
        search: Option<Arc<dyn SearchProvider>>,
        clock: Arc<dyn Clock>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            inference,
            pages,
            search,
            pacer: Pacer::new(clock, config.enrich_delay),
            model: config.enricher_model.clone(),
            item_timeout: config.item_timeout,
            max_chars: config.enrich_max_chars,
            fallback_max_results: config.fallback_max_results,
        }
    }

    /// Enrich opportunities one at a time.
    ///
    /// Records without an id or kind are skipped untouched. A record whose
    /// refinement fails is dropped rather than emitted half-enriched.
    #[instrument(skip_all, fields(opportunities = opportunities.len()))]
    pub async fn run(
        &self,
        opportunities: Vec<FundingOpportunity>,
        progress: &dyn ProgressReporter,
    ) -> StageReport<FundingOpportunity> {
        let total = opportunities.len();
        let mut outcomes = Vec::with_capacity(total);

        for (index, opportunity) in opportunities.into_iter().enumerate() {
            let label = opportunity.label();
            progress.item(index + 1, total, &label);

            let precondition = if opportunity.id.is_none() {
                Some((SkipReason::MissingId, "record has no id"))
            } else if opportunity.kind.is_none() {
                Some((SkipReason::MissingKind, "record has no type"))
            } else {
                None
            };
            if let Some((reason, detail)) = precondition {
                outcomes.push(self.skip(index, &label, reason, detail.to_string(), progress));
                continue;
            }

            self.pacer.wait().await;

            let outcome = match tokio::time::timeout(self.item_timeout, self.enrich(&opportunity)).await {
                Ok(Ok(refined)) => {
                    info!(origin = %label, url = refined.opportunity_url.as_deref().unwrap_or(""), "opportunity enriched");
                    ItemOutcome::Kept(vec![refined])
                }
                Ok(Err(e)) => self.skip(index, &label, SkipReason::Enrichment, e.to_string(), progress),
                Err(_) => self.skip(
                    index,
                    &label,
                    SkipReason::Timeout,
                    format!("no refinement within {}s", self.item_timeout.as_secs()),
                    progress,
                ),
            };
            outcomes.push(outcome);
        }

        let report = StageReport::from_outcomes(outcomes);
        info!(
            enriched = report.items.len(),
            skipped = report.skipped.len(),
            "enrichment complete"
        );
        report
    }

    async fn enrich(&self, original: &FundingOpportunity) -> Result<FundingOpportunity> {
        let url = match original.opportunity_url.clone() {
            Some(url) => Some(url),
            None => self.find_url(original).await,
        };

        let page_text = match url.as_deref() {
            Some(url) => match self.pages.fetch_text(url).await {
                Ok(text) => truncate_chars(&text, self.max_chars).to_string(),
                Err(e) => {
                    warn!(%url, error = %e, "page fetch failed, refining from placeholder");
                    ENRICH_FETCH_FAILED.to_string()
                }
            },
            None => ENRICH_NO_URL.to_string(),
        };

        let mut input = original.clone();
        input.opportunity_url = url.clone();

        let request = InferenceRequest::for_output::<RefinedOpportunity>(
            "enrich",
            &self.model,
            prompts::ENRICHER_SYSTEM,
            prompts::enricher_user(&input, &page_text),
        );
        let reply: RefinedOpportunity = infer_as(self.inference.as_ref(), request).await?;

        let mut refined = reply.into_opportunity(original);
        refined.sanitize();
        if refined.opportunity_url.is_none() {
            refined.opportunity_url = url;
        }
        Ok(refined)
    }

    /// One best-effort search for an official page.
    async fn find_url(&self, opportunity: &FundingOpportunity) -> Option<String> {
        let Some(search) = &self.search else {
            debug!(origin = %opportunity.label(), "no search provider for url fallback");
            return None;
        };

        let query = prompts::fallback_url_query(opportunity);
        match first_result_url(search.as_ref(), &query, self.fallback_max_results).await {
            Ok(Some(url)) => {
                info!(origin = %opportunity.label(), %url, "url found by search");
                Some(url)
            }
            Ok(None) => {
                debug!(origin = %opportunity.label(), "url search returned nothing");
                None
            }
            Err(e) => {
                warn!(origin = %opportunity.label(), error = %e, "url search failed");
                None
            }
        }
    }

    fn skip(
        &self,
        index: usize,
        label: &str,
        reason: SkipReason,
        detail: String,
        progress: &dyn ProgressReporter,
    ) -> ItemOutcome<Vec<FundingOpportunity>> {
        let skip = SkippedItem::new(index, label, reason, detail);
        warn!(origin = %label, %reason, error = %skip.detail, "enrichment skipped");
        progress.item_skipped(&skip);
        ItemOutcome::Skipped(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use crate::testing::{FakeClock, ScriptedInference, ScriptedPages, ScriptedSearch};
    use grantscout_shared::{AppConfig, OpportunityKind};
    use serde_json::json;

    fn config() -> PipelineConfig {
        PipelineConfig::from(&AppConfig::default())
    }

    fn opportunity(id: Option<&str>, kind: Option<OpportunityKind>, url: Option<&str>) -> FundingOpportunity {
        FundingOpportunity {
            id: id.map(Into::into),
            kind,
            origin: "Minciencias".into(),
            description: "AI research call".into(),
            financing_type: None,
            main_requirements: vec![],
            application_deadline: None,
            opportunity_url: url.map(String::from),
        }
    }

    fn refined(url: Option<&str>) -> serde_json::Value {
        json!({
            "id": null,
            "type": "International",
            "origin": "Minciencias",
            "description": "AI research call, up to 500M COP",
            "financing_type": "grant",
            "main_requirements": ["Colombian university"],
            "application_deadline": "2025-11-30",
            "opportunity_url": url
        })
    }

    fn enricher(
        inference: Arc<ScriptedInference>,
        pages: ScriptedPages,
        search: Option<Arc<ScriptedSearch>>,
    ) -> Enricher {
        Enricher::new(
            inference,
            Arc::new(pages),
            search.map(|s| s as Arc<dyn SearchProvider>),
            Arc::new(FakeClock::new()),
            &config(),
        )
    }

    #[tokio::test]
    async fn id_and_kind_override_is_unconditional() {
        let inference = Arc::new(ScriptedInference::new().reply("enrich", refined(None)));
        let pages = ScriptedPages::new().page("https://minciencias.gov.co/c", "Deadline 2025-11-30");
        let enricher = enricher(inference.clone(), pages, None);

        let report = enricher
            .run(
                vec![opportunity(Some("abc123"), Some(OpportunityKind::National), Some("https://minciencias.gov.co/c"))],
                &SilentProgress,
            )
            .await;

        let out = &report.items[0];
        assert_eq!(out.id, Some("abc123".into()));
        assert_eq!(out.kind, Some(OpportunityKind::National));
        assert_eq!(out.application_deadline.as_deref(), Some("2025-11-30"));
        // url never regresses to absent
        assert_eq!(out.opportunity_url.as_deref(), Some("https://minciencias.gov.co/c"));
        assert!(inference.requests("enrich")[0].user.contains("Deadline 2025-11-30"));
    }

    #[tokio::test]
    async fn unusable_id_and_type_in_reply_are_ignored() {
        let mut reply = refined(None);
        reply["id"] = json!(42);
        reply["type"] = json!("Nacional");
        let inference = Arc::new(ScriptedInference::new().reply("enrich", reply));
        let pages = ScriptedPages::new().page("https://minciencias.gov.co/c", "Deadline 2025-11-30");
        let enricher = enricher(inference.clone(), pages, None);

        let report = enricher
            .run(
                vec![opportunity(Some("abc123"), Some(OpportunityKind::National), Some("https://minciencias.gov.co/c"))],
                &SilentProgress,
            )
            .await;

        assert!(report.skipped.is_empty());
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].id, Some("abc123".into()));
        assert_eq!(report.items[0].kind, Some(OpportunityKind::National));
        assert_eq!(report.items[0].financing_type.as_deref(), Some("grant"));
        let schema = &inference.requests("enrich")[0].schema;
        assert!(schema["properties"].get("id").is_none());
        assert!(schema["properties"].get("type").is_none());
    }

    #[tokio::test]
    async fn pacing_holds_across_failed_items() {
        let inference = Arc::new(
            ScriptedInference::new()
                .reply("enrich", refined(None))
                .fail("enrich", "upstream 500")
                .reply("enrich", refined(None)),
        );
        let pages = ScriptedPages::new().page("https://x.org", "page");
        let clock = Arc::new(FakeClock::new());
        let cfg = config();
        let enricher = Enricher::new(inference, Arc::new(pages), None, clock.clone(), &cfg);

        let report = enricher
            .run(
                vec![
                    opportunity(Some("a"), Some(OpportunityKind::National), Some("https://x.org")),
                    opportunity(Some("b"), Some(OpportunityKind::National), Some("https://x.org")),
                    opportunity(Some("c"), Some(OpportunityKind::National), Some("https://x.org")),
                ],
                &SilentProgress,
            )
            .await;

        assert_eq!(report.items.len(), 2);
        assert_eq!(report.count_skipped(SkipReason::Enrichment), 1);
        assert_eq!(clock.sleeps(), vec![cfg.enrich_delay; 2]);
    }

    #[tokio::test]
    async fn records_missing_id_or_kind_are_skipped_without_calls() {
        let inference = Arc::new(ScriptedInference::new().reply("enrich", refined(Some("https://x.org"))));
        let pages = Arc::new(ScriptedPages::new().page("https://x.org", "page"));
        let clock = Arc::new(FakeClock::new());
        let enricher = Enricher::new(inference.clone(), pages.clone(), None, clock.clone(), &config());

        let report = enricher
            .run(
                vec![
                    opportunity(None, Some(OpportunityKind::National), Some("https://x.org")),
                    opportunity(Some("k1"), None, Some("https://x.org")),
                    opportunity(Some("ok"), Some(OpportunityKind::International), Some("https://x.org")),
                ],
                &SilentProgress,
            )
            .await;

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].id, Some("ok".into()));
        assert_eq!(report.count_skipped(SkipReason::MissingId), 1);
        assert_eq!(report.count_skipped(SkipReason::MissingKind), 1);
        assert_eq!(inference.requests("enrich").len(), 1);
        assert_eq!(pages.fetched(), vec!["https://x.org"]);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn missing_url_is_resolved_by_search() {
        let inference = Arc::new(ScriptedInference::new().reply("enrich", refined(None)));
        let search = Arc::new(ScriptedSearch::hits(json!([
            {"title": "Official", "url": "https://minciencias.gov.co/found", "content": "call"}
        ])));
        let pages = ScriptedPages::new().page("https://minciencias.gov.co/found", "Official page");
        let enricher = enricher(inference.clone(), pages, Some(search.clone()));

        let report = enricher
            .run(vec![opportunity(Some("a"), Some(OpportunityKind::National), None)], &SilentProgress)
            .await;

        assert_eq!(
            report.items[0].opportunity_url.as_deref(),
            Some("https://minciencias.gov.co/found")
        );
        assert_eq!(
            search.queries(),
            vec!["funding opportunity official page Minciencias AI research call"]
        );
        assert!(inference.requests("enrich")[0].user.contains("Official page"));
    }

    #[tokio::test]
    async fn failed_search_and_no_url_uses_placeholder() {
        let inference = Arc::new(ScriptedInference::new().reply("enrich", refined(None)));
        let enricher = enricher(
            inference.clone(),
            ScriptedPages::new(),
            Some(Arc::new(ScriptedSearch::failing())),
        );

        let report = enricher
            .run(vec![opportunity(Some("a"), Some(OpportunityKind::National), None)], &SilentProgress)
            .await;

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].opportunity_url, None);
        assert!(inference.requests("enrich")[0].user.contains(ENRICH_NO_URL));
    }

    #[tokio::test]
    async fn fetch_failure_uses_error_placeholder() {
        let inference = Arc::new(ScriptedInference::new().reply("enrich", refined(None)));
        let enricher = enricher(inference.clone(), ScriptedPages::new(), None);

        let report = enricher
            .run(
                vec![opportunity(Some("a"), Some(OpportunityKind::National), Some("https://gone.org"))],
                &SilentProgress,
            )
            .await;

        assert_eq!(report.items[0].opportunity_url.as_deref(), Some("https://gone.org"));
        assert!(inference.requests("enrich")[0].user.contains(ENRICH_FETCH_FAILED));
    }

    #[tokio::test]
    async fn refinement_failure_drops_the_record() {
        let inference = Arc::new(
            ScriptedInference::new()
                .fail("enrich", "schema mismatch")
                .reply("enrich", refined(Some("https://b.org"))),
        );
        let pages = ScriptedPages::new().page("https://a.org", "A").page("https://b.org", "B");
        let enricher = enricher(inference, pages, None);

        let report = enricher
            .run(
                vec![
                    opportunity(Some("a"), Some(OpportunityKind::National), Some("https://a.org")),
                    opportunity(Some("b"), Some(OpportunityKind::National), Some("https://b.org")),
                ],
                &SilentProgress,
            )
            .await;

        assert_eq!(report.items.len(), 1);
        assert_eq!(report.items[0].id, Some("b".into()));
        assert_eq!(report.count_skipped(SkipReason::Enrichment), 1);
    }

    #[tokio::test]
    async fn refined_url_replaces_the_original() {
        let inference = Arc::new(ScriptedInference::new().reply("enrich", refined(Some("https://direct.org/call"))));
        let pages = ScriptedPages::new().page("https://list.org", "See https://direct.org/call");
        let enricher = enricher(inference, pages, None);

        let report = enricher
            .run(
                vec![opportunity(Some("a"), Some(OpportunityKind::National), Some("https://list.org"))],
                &SilentProgress,
            )
            .await;

        assert_eq!(report.items[0].opportunity_url.as_deref(), Some("https://direct.org/call"));
    }
}
