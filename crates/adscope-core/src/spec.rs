//! Typed task specifications.
//!
//! A unit of crawl work is described by four spec levels plus a continuation
//! blob. The levels form a hierarchy (experiment → split → page → attempt)
//! and are stored as independent JSON columns on the queue row. When a value
//! appears at more than one level, the later level overrides the earlier one;
//! [`TaskSpecs`] exposes that overlay through explicit accessors instead of
//! merging dictionaries.

use serde::{Deserialize, Serialize};

/// Experiment-level configuration: what to search for and how to partition it.
///
/// One experiment covers a full crawl of the ad archive for a named preset
/// (e.g. all political ads reaching one country). It is immutable for the
/// lifetime of its task lineages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    /// Preset name this experiment was created from (lowercase).
    pub experiment_key: String,
    /// Timestamped folder all raw downloads for this experiment land in.
    pub experiment_folder: String,
    /// Queue priority for every task of this experiment; higher runs first.
    pub task_priority: i64,
    /// Archive ad type filter (e.g. `POLITICAL_AND_ISSUE_ADS`).
    pub ad_type: String,
    /// Archive active-status filter (e.g. `ALL`).
    pub ad_active_status: String,
    /// Response fields requested per ad.
    pub ad_fields: Vec<String>,
    /// Countries the ads must have reached.
    pub countries: Vec<String>,
    /// Full-text search terms (unused when searching by advertiser).
    pub search_terms: Vec<String>,
    /// Advertiser page ids to search by (used when `search_by_advertisers`).
    pub advertisers: Vec<String>,
    /// Platform filter (empty means all platforms).
    pub platforms: Vec<String>,
    /// Impression window in days; non-positive means lifetime.
    pub last_n_days: i64,
    /// Starting page size; later attempts override this adaptively.
    pub ads_per_page: u32,
    /// Countries per split when splitting by country.
    pub countries_per_split: usize,
    /// Advertisers per split when splitting by advertiser.
    pub advertisers_per_split: usize,
    /// Split by advertiser page ids instead of by country.
    pub search_by_advertisers: bool,
}

/// Split-level configuration: one partition of the experiment's target set.
///
/// Exactly one of `countries`/`advertisers` is non-empty, depending on the
/// experiment's split mode; the non-empty list overrides the experiment-level
/// one for this lineage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SplitSpec {
    /// Zero-based index of this split within the experiment.
    pub split_index: u32,
    /// Total number of splits the experiment was partitioned into.
    pub split_count: u32,
    /// Countries assigned to this split (country-mode experiments).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<String>,
    /// Advertiser page ids assigned to this split (advertiser-mode).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advertisers: Vec<String>,
}

/// Page-level coordinates: which paginated fetch within the split this is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpec {
    /// Zero-based page index; advances on success, never on retry.
    pub page_index: u32,
}

/// Attempt-level coordinates and the adaptive page-size override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptSpec {
    /// Consecutive attempts at the current page (reset on page advance).
    pub page_attempt: u32,
    /// Total attempts across the whole split lineage.
    pub attempt_index: u32,
    /// Adaptive page size; overrides the experiment default once set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ads_per_page: Option<u32>,
}

/// Resumption state threaded between successive attempts of one lineage.
///
/// The error history and failed flag are cleared only by the success path of
/// the continuation policy; an external restart leaves them in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Continuation {
    /// Pagination cursor to resume from (absent on the first page).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_token: Option<String>,
    /// Ads accumulated across all finished pages of this lineage.
    #[serde(default)]
    pub total_ad_count: u64,
    /// Finish codes of prior failed attempts, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_codes: Vec<i64>,
    /// Set when the lineage was forcibly terminated; a task created from a
    /// failed continuation is inserted already marked failed.
    #[serde(default)]
    pub failed: bool,
}

/// The full description of one unit of crawl work.
///
/// This is what the queue stores per row and what the continuation policy
/// transforms into the next unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpecs {
    /// Experiment-level configuration.
    pub experiment: ExperimentSpec,
    /// Split-level partition.
    pub split: SplitSpec,
    /// Page coordinates.
    pub page: PageSpec,
    /// Attempt coordinates and page-size override.
    pub attempt: AttemptSpec,
    /// Resumption state.
    pub continuation: Continuation,
}

impl TaskSpecs {
    /// Queue priority of this task.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.experiment.task_priority
    }

    /// Effective page size: the attempt-level override when present,
    /// otherwise the experiment default.
    #[must_use]
    pub fn ads_per_page(&self) -> u32 {
        self.attempt.ads_per_page.unwrap_or(self.experiment.ads_per_page)
    }

    /// Effective country list: the split's partition when non-empty,
    /// otherwise the experiment-wide list.
    #[must_use]
    pub fn countries(&self) -> &[String] {
        if self.split.countries.is_empty() {
            &self.experiment.countries
        } else {
            &self.split.countries
        }
    }

    /// Effective advertiser list: the split's partition when non-empty,
    /// otherwise the experiment-wide list.
    #[must_use]
    pub fn advertisers(&self) -> &[String] {
        if self.split.advertisers.is_empty() {
            &self.experiment.advertisers
        } else {
            &self.split.advertisers
        }
    }

    /// Pagination cursor to resume from, when the lineage has one.
    #[must_use]
    pub fn after_token(&self) -> Option<&str> {
        self.continuation.after_token.as_deref()
    }
}

/// Structured outcome of one executed attempt, produced by the archive
/// client and written onto the queue row by `amend`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinishLog {
    /// Access token the attempt ran with. Required by `amend`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Number of ads in the response page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ad_count: Option<i64>,
    /// Next-page cursor reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging_cursor: Option<String>,
    /// Provider error code, when the response carried an error object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i64>,
    /// Provider error message accompanying `error_code`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Free-form note about where the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Updated resumption state for the next attempt of this lineage.
    #[serde(default)]
    pub continuation: Continuation,
}
