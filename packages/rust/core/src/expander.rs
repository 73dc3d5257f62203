//! Query expansion: project brief to search query pairs.

use grantscout_inference::{InferenceRequest, StructuredInference, infer_as};
use grantscout_shared::{ModelChoice, ProjectBrief, QueryList, Result, SearchQueryPair};
use tracing::{info, instrument};

use crate::prompts;

/// Expand a project brief into search query pairs with one inference call.
///
/// The count is whatever the model returns. Failure is fatal for the run and
/// is not retried here.
#[instrument(skip_all, fields(title = %brief.title))]
pub async fn expand_queries(
    inference: &dyn StructuredInference,
    model: &ModelChoice,
    brief: &ProjectBrief,
) -> Result<Vec<SearchQueryPair>> {
    let request = InferenceRequest::for_output::<QueryList>(
        "queries",
        model,
        prompts::QUERY_SYSTEM,
        prompts::query_user(brief),
    );

    let list: QueryList = infer_as(inference, request).await?;
    info!(pairs = list.queries.len(), "queries generated");
    Ok(list.queries)
}
