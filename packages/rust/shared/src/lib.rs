//! Shared types, error model, and configuration for docweave.
//!
//! This crate is the foundation depended on by all other docweave crates.
//! It provides:
//! - [`DocweaveError`] — the unified (fatal) error type
//! - Domain types ([`Target`], [`LinkKind`], [`IndexEntry`], [`SourceSpec`], [`BuildReport`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], [`EngineSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildSettings, ComponentConfig, ComponentDeclaration, DefaultsConfig,
    EngineSettings, PipelineConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, load_pipeline,
};
pub use error::{DocweaveError, Result};
pub use types::{
    BuildReport, BuildWarning, IndexEntry, LinkKind, ResolutionMiss, RunId, SourceFormat,
    SourceSpec, Target, TopicError,
};
