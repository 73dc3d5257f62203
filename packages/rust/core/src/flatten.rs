//! Normalize mixed stage outputs into one list of plain JSON mappings.

use grantscout_shared::FundingOpportunity;
use serde_json::{Map, Value};
use tracing::warn;

/// Anything a stage may hand to the final formatter.
#[derive(Debug, Clone)]
pub enum OpportunityOutput {
    Opportunity(Box<FundingOpportunity>),
    Mapping(Map<String, Value>),
    Batch(Vec<OpportunityOutput>),
}

impl From<FundingOpportunity> for OpportunityOutput {
    fn from(opportunity: FundingOpportunity) -> Self {
        Self::Opportunity(Box::new(opportunity))
    }
}

impl From<Map<String, Value>> for OpportunityOutput {
    fn from(mapping: Map<String, Value>) -> Self {
        Self::Mapping(mapping)
    }
}

impl<T: Into<OpportunityOutput>> From<Vec<T>> for OpportunityOutput {
    fn from(items: Vec<T>) -> Self {
        Self::Batch(items.into_iter().map(Into::into).collect())
    }
}

/// Flatten outputs depth-first, preserving order.
///
/// Mappings pass through untouched, so flattening an already-flat list
/// returns it unchanged.
pub fn flatten_opportunities<I>(outputs: I) -> Vec<Map<String, Value>>
where
    I: IntoIterator<Item = OpportunityOutput>,
{
    let mut flat = Vec::new();
    for output in outputs {
        push_flat(output, &mut flat);
    }
    flat
}

fn push_flat(output: OpportunityOutput, flat: &mut Vec<Map<String, Value>>) {
    match output {
        OpportunityOutput::Mapping(mapping) => flat.push(mapping),
        OpportunityOutput::Batch(items) => {
            for item in items {
                push_flat(item, flat);
            }
        }
        OpportunityOutput::Opportunity(opportunity) => match serde_json::to_value(&*opportunity) {
            Ok(Value::Object(mapping)) => flat.push(mapping),
            Ok(other) => warn!(value = %other, "opportunity did not serialize to an object"),
            Err(e) => warn!(origin = %opportunity.label(), error = %e, "opportunity could not be serialized"),
        },
    }
}
