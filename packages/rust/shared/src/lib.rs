//! Shared types, error model, and configuration for litscreen.
//!
//! This crate is the foundation depended on by all other litscreen crates.
//! It provides:
//! - [`LitScreenError`], the unified error type
//! - Domain types ([`RowId`], [`BatchItem`], [`BatchDecision`], [`DocumentVerdict`])
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AnalysisConfig, AppConfig, ScreeningConfig, ServiceConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{LitScreenError, Result};
pub use types::{
    BatchDecision, BatchItem, DocumentVerdict, ERROR_CATEGORY, RowId, SEPARATOR_MARKER,
    UNRESOLVED_SENTINELS, is_unresolved,
};
