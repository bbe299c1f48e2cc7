//! Fusion pipelines and domain logic for J-Book budget datasets.
//!
//! This crate ties the structured-table parser, the R-2 narrative
//! extractor and the LLM client together into end-to-end workflows:
//! [`run_pipeline`] / [`run_batch`] produce the enriched CSV,
//! [`run_tagging`] labels it, and [`ReviewSession`] backs the dashboard.

pub mod dataset;
pub mod fusion;
pub mod pipeline;
pub mod review;
pub mod tagging;

pub use dataset::{read_records, to_csv_bytes, write_enriched, write_tagged};
pub use fusion::fuse;
pub use pipeline::{
    BatchConfig, BatchResult, PipelineConfig, PipelineResult, ProgressReporter, SilentProgress,
    gather_files, run_batch, run_pipeline,
};
pub use review::{ReviewFilter, ReviewSession, format_currency, parse_weights};
pub use tagging::{
    TagConfig, TagResult, TagStats, TaggingOptions, load_definitions, parse_definitions,
    resolve_llm_client, rule_based_relevance, run_tagging, tag_batch,
};
