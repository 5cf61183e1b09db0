//! Adscope Core - Foundation crate for the adscope crawl engine.
//!
//! This crate provides the shared types, error handling, and configuration
//! management that all other adscope crates depend on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Shared newtypes (`TaskKey`, `FinishCode`)
//! - [`spec`] - Typed task specifications and the continuation blob
//!
//! # Example
//!
//! ```rust
//! use adscope_core::{CrawlConfig, FinishCode};
//!
//! let config = CrawlConfig::default();
//! assert_eq!(config.rate_limit.requests_per_window, 50);
//! assert!(FinishCode::SUCCESS.is_success());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod config;
pub mod error;
pub mod spec;
pub mod types;

// Re-export commonly used types
pub use config::{
    ClientConfig, CrawlConfig, ExperimentPreset, PagingConfig, RateLimitConfig, RunConfig,
    StorageConfig,
};
pub use error::{AdscopeError, ConfigError, ConfigResult, Result};
pub use spec::{
    AttemptSpec, Continuation, ExperimentSpec, FinishLog, PageSpec, SplitSpec, TaskSpecs,
};
pub use types::{FinishCode, TaskKey};
