//! Shared types, error model, and configuration for the J-Book toolkit.
//!
//! This crate is the foundation depended on by all other J-Book crates.
//! It provides:
//! - [`JbookError`]: the unified error type
//! - Domain types ([`CostRow`], [`R2Sections`], [`EnrichedRecord`], [`TaggedRecord`])
//! - Configuration ([`AppConfig`], config loading, dotenv handling)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, CacheConfig, DefaultsConfig, LlmConfig, ProviderKind, RelevanceWeights,
    TaggingConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    load_env_file, validate_api_key,
};
pub use error::{JbookError, Result};
pub use types::{
    CostRow, ENRICHED_COLUMNS, EmbeddedFile, EnrichedRecord, R2Sections, Relevance,
    TAGGED_COLUMNS, TaggedRecord,
};
