//! Configuration module for Casa-Ripple
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use casa_ripple::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("casa.toml")).unwrap();
//! println!("Publishers configured: {}", config.publishers.len());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BackendKind, BrowserConfig, Config, CrawlSettings, DetailConfig, FieldRule, FormConfig,
    MapperConfig, PublisherConfig, PublisherSearch, QueryConfig, QueryParams, ResultsConfig,
    SearchSettings, SearcherKind, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
