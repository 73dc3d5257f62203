//! Shared types, error model, and configuration for GrantScout.
//!
//! This crate is the foundation depended on by all other GrantScout crates.
//! It provides:
//! - [`GrantScoutError`], the unified error type
//! - Domain types ([`FundingOpportunity`], [`CandidateSource`], [`FlatQuery`], ...)
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Credentials, FeedsConfig, FilterConfig, LimitsConfig, LlmConfig, ModelChoice,
    OutputConfig, PacingConfig, PipelineConfig, RetryPolicy, SearchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_credentials,
};
pub use error::{GrantScoutError, Result};
pub use types::{
    CandidateSource, FlatQuery, FundingOpportunity, FundingOpportunityBatch, OpportunityId,
    OpportunityKind, ProjectBrief, QueryList, ScrutinyVerdict, SearchQueryPair,
};
