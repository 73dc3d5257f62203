//! Pipeline orchestration for GrantScout.
//!
//! This crate threads query expansion, retrieval, relevance filtering,
//! extraction, checkpointing and enrichment into end-to-end runs
//! (e.g., [`Pipeline::run_full`]).

pub mod checkpoint;
pub mod enricher;
pub mod expander;
pub mod extractor;
pub mod filter;
pub mod flatten;
pub mod pacing;
pub mod pipeline;
pub mod prompts;
pub mod report;

#[cfg(test)]
mod testing;

pub use checkpoint::{
    LoadedCheckpoint, assign_ids, assign_missing_ids, load_checkpoint, save_checkpoint,
    write_json_atomic,
};
pub use enricher::Enricher;
pub use expander::expand_queries;
pub use extractor::Extractor;
pub use filter::RelevanceFilter;
pub use flatten::{OpportunityOutput, flatten_opportunities};
pub use pacing::{Clock, Pacer, TokioClock};
pub use pipeline::{Pipeline, PipelineDeps, ProgressReporter, RunSummary, SilentProgress};
pub use report::{SkipReason, SkippedItem, StageReport};
