//! Shared types, error model, and configuration for zimport.
//!
//! This crate is the foundation depended on by all other zimport crates.
//! It provides:
//! - [`ZimportError`]: the unified error type
//! - Domain types ([`ArchiveReference`], [`ServerHandle`], [`RetrievedDocument`],
//!   [`ArticleRecord`])
//! - Configuration ([`AppConfig`] and its sections, config loading)
//! - [`write_atomic`] for all-or-nothing output files

pub mod config;
pub mod error;
pub mod fs;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ExtractConfig, FetchConfig, RevisionConfig, ServerConfig, SiteConfig, config_dir,
    config_file_path, default_server_binary, init_config, load_config, load_config_from,
};
pub use error::{FetchFailure, Result, ZimportError};
pub use fs::write_atomic;
pub use types::{ArchiveReference, ArticleRecord, RetrievedDocument, RunId, ServerHandle};
