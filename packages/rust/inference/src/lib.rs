//! Structured-inference collaborator.
//!
//! The pipeline never talks to a model directly. Every stage builds an
//! [`InferenceRequest`] (system instructions, user content, target schema) and
//! hands it to a [`StructuredInference`] implementation, which returns a JSON
//! value conforming to the schema or fails.

mod client;
mod schema;

use async_trait::async_trait;
use grantscout_shared::{GrantScoutError, ModelChoice, Result};
use serde_json::Value;

pub use client::OpenRouterClient;
pub use schema::StructuredOutput;

/// One structured-inference call.
#[derive(Debug, Clone)]
pub struct InferenceRequest {
    /// Short task label used in logs ("queries", "classify", ...).
    pub task: &'static str,
    pub model: String,
    pub temperature: f32,
    pub system: String,
    pub user: String,
    /// Name of the target schema.
    pub schema_name: String,
    /// Strict JSON schema the output must satisfy.
    pub schema: Value,
}

impl InferenceRequest {
    /// Build a request whose output schema is derived from `T`.
    pub fn for_output<T: StructuredOutput>(
        task: &'static str,
        model: &ModelChoice,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            task,
            model: model.model.clone(),
            temperature: model.temperature,
            system: system.into(),
            user: user.into(),
            schema_name: T::output_name(),
            schema: T::strict_schema(),
        }
    }
}

/// A capability that turns a prompt plus a schema into a conforming JSON value.
#[async_trait]
pub trait StructuredInference: Send + Sync {
    async fn infer(&self, request: InferenceRequest) -> Result<Value>;
}

/// Run `request` and deserialize the result as `T`.
///
/// A value that does not match `T` is an [`GrantScoutError::Inference`] error.
pub async fn infer_as<T, I>(inference: &I, request: InferenceRequest) -> Result<T>
where
    T: StructuredOutput,
    I: StructuredInference + ?Sized,
{
    let task = request.task;
    let schema_name = request.schema_name.clone();
    let value = inference.infer(request).await?;
    serde_json::from_value(value).map_err(|e| {
        GrantScoutError::Inference(format!("{task}: output does not match {schema_name}: {e}"))
    })
}

/// Strip a markdown code fence some models wrap JSON output in.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use grantscout_shared::ScrutinyVerdict;

    struct Canned(Value);

    #[async_trait]
    impl StructuredInference for Canned {
        async fn infer(&self, _request: InferenceRequest) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    fn model() -> ModelChoice {
        ModelChoice {
            model: "test/model".into(),
            temperature: 0.1,
        }
    }

    #[test]
    fn strip_code_blocks_variants() {
        assert_eq!(strip_code_blocks("```json\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  {}  "), "{}");
    }

    #[test]
    fn request_carries_model_and_schema() {
        let req = InferenceRequest::for_output::<ScrutinyVerdict>("classify", &model(), "sys", "user");
        assert_eq!(req.model, "test/model");
        assert_eq!(req.schema_name, "ScrutinyVerdict");
        assert!(req.schema["properties"]["is_relevant"].is_object());
    }

    #[tokio::test]
    async fn infer_as_deserializes() {
        let canned = Canned(serde_json::json!({"is_relevant": true, "reason": null}));
        let req = InferenceRequest::for_output::<ScrutinyVerdict>("classify", &model(), "s", "u");
        let verdict: ScrutinyVerdict = infer_as(&canned, req).await.expect("verdict");
        assert!(verdict.is_relevant);
        assert_eq!(verdict.reason, None);
    }

    #[tokio::test]
    async fn infer_as_rejects_mismatched_output() {
        let canned = Canned(serde_json::json!({"relevant": "maybe"}));
        let req = InferenceRequest::for_output::<ScrutinyVerdict>("classify", &model(), "s", "u");
        let err = infer_as::<ScrutinyVerdict, _>(&canned, req).await.unwrap_err();
        assert!(matches!(err, GrantScoutError::Inference(_)));
        assert!(err.to_string().contains("ScrutinyVerdict"));
    }
}
