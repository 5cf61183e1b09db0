//! Adscope Crawler - the crawl engine.
//!
//! This crate drives long-running, rate-limited crawls of an advertising
//! transparency archive. It owns the three pieces of real scheduling logic:
//!
//! - the **continuation policy** ([`continuation`]): a pure function that
//!   turns an executed task's outcome into the next unit of work (or none)
//! - the **rate limiter** ([`rate_limiter`]): sliding-window throttling of
//!   outbound requests against the provider quota
//! - the **driver loop** ([`runner`]): strictly sequential orchestration of
//!   queue, limiter, and archive client
//!
//! The HTTP client itself is a collaborator behind the [`client`] trait
//! seam; the engine only produces task descriptions and consumes structured
//! outcomes.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]

pub mod client;
pub mod continuation;
pub mod error;
pub mod planner;
pub mod rate_limiter;
pub mod runner;

// Re-export commonly used types
pub use client::{AdArchiveClient, FetchOutcome, GraphClient, StaticTokenProvider, TokenProvider};
pub use continuation::continue_task;
pub use error::{CrawlError, Result};
pub use rate_limiter::RateLimiter;
pub use runner::{RunSummary, Runner};
