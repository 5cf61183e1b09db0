//! The continuation policy.
//!
//! A pure decision function with no I/O: given a just-executed task, its
//! finish code, and the finish log, produce the next unit of work for the
//! same split lineage, or `None` when the lineage is done.
//!
//! Per-lineage state machine:
//!
//! ```text
//! ACTIVE(page, attempt) → ACTIVE(page+1, attempt+1)  on success
//!                       → ACTIVE(page, attempt+1)    on retryable failure
//!                       → FAILED(page, attempt)      on attempt cap / token expiry
//!                       → DONE                       on terminal code
//! ```
//!
//! `FAILED` re-enters `ACTIVE` only through an explicit external restart.

use adscope_core::config::PagingConfig;
use adscope_core::spec::{FinishLog, TaskSpecs};
use adscope_core::types::FinishCode;
use rand::Rng;

/// Decide the next task for a lineage from an executed task's outcome.
///
/// Checked in order:
///
/// 1. code `0`: advance the page, reset the per-page attempt counter, clear
///    the error history, and probe a larger page size
/// 2. code `190` (expired token): retry the same page unresized, but mark
///    the continuation failed immediately; token expiry needs a human, not
///    backoff
/// 3. other positive codes: retry the same page at a shrunk page size until
///    the per-page attempt cap, then mark failed
/// 4. code `-1`: clean end of pagination, no successor
/// 5. other negative codes (transport/parse): retry unresized with the same
///    attempt-cap rule
///
/// The returned task carries the continuation from `finish_log` (cursor and
/// running ad total updated by the client), not the one the task ran with.
pub fn continue_task<R: Rng + ?Sized>(
    task: &TaskSpecs,
    finish_code: FinishCode,
    finish_log: &FinishLog,
    config: &PagingConfig,
    rng: &mut R,
) -> Option<TaskSpecs> {
    let mut next = TaskSpecs {
        experiment: task.experiment.clone(),
        split: task.split.clone(),
        page: task.page,
        attempt: task.attempt.clone(),
        continuation: finish_log.continuation.clone(),
    };
    let ads_per_page = task.ads_per_page();

    // Success: next page, bigger bite
    if finish_code.is_success() {
        next.page.page_index += 1;
        next.attempt.attempt_index += 1;
        next.attempt.page_attempt = 0;
        next.continuation.error_codes.clear();
        next.continuation.failed = false;
        next.attempt.ads_per_page = Some(grow_page_size(ads_per_page, config, rng));
        return Some(next);
    }

    // Expired access token: retry once a fresh token is in place, but the
    // lineage is dead until someone intervenes
    if finish_code.is_expired_token() {
        next.attempt.attempt_index += 1;
        next.attempt.page_attempt += 1;
        next.continuation.error_codes.push(finish_code.as_i64());
        next.continuation.failed = true;
        return Some(next);
    }

    // Provider error: retry the same page with fewer ads
    if finish_code.is_provider_error() {
        next.attempt.attempt_index += 1;
        next.attempt.page_attempt += 1;
        next.continuation.error_codes.push(finish_code.as_i64());

        if next.attempt.page_attempt >= config.max_page_attempts {
            next.continuation.failed = true;
            return Some(next);
        }

        next.attempt.ads_per_page = Some(shrink_page_size(ads_per_page, config, rng));
        return Some(next);
    }

    // Terminal page: this lineage is done
    if finish_code.is_end_of_pages() {
        return None;
    }

    // Transport or parse failure: retry at the same page size
    next.attempt.attempt_index += 1;
    next.attempt.page_attempt += 1;
    next.continuation.error_codes.push(finish_code.as_i64());

    if next.attempt.page_attempt >= config.max_page_attempts {
        next.continuation.failed = true;
    }

    Some(next)
}

/// Grow the page size multiplicatively, rounding up.
fn grow_page_size<R: Rng + ?Sized>(ads_per_page: u32, config: &PagingConfig, rng: &mut R) -> u32 {
    let adjusted = f64::from(ads_per_page) * config.increase_factor;
    let jittered = apply_jitter(adjusted, config, rng);
    clamp_page_size(jittered.ceil(), config)
}

/// Shrink the page size multiplicatively, rounding down.
///
/// The floor here against the ceil on growth is deliberate: under
/// oscillating success and failure the page size drifts slightly downward.
fn shrink_page_size<R: Rng + ?Sized>(ads_per_page: u32, config: &PagingConfig, rng: &mut R) -> u32 {
    let adjusted = f64::from(ads_per_page) * config.decrease_factor;
    let jittered = apply_jitter(adjusted, config, rng);
    clamp_page_size(jittered.floor(), config)
}

/// Add bounded noise so many concurrent split crawls against the same
/// provider don't resize in lockstep: a multiplicative nudge up, a divisive
/// nudge down, and a few ads either way.
fn apply_jitter<R: Rng + ?Sized>(ads_per_page: f64, config: &PagingConfig, rng: &mut R) -> f64 {
    let x1 = ads_per_page * rng.gen_range(1.0..=config.jitter_multiply) - ads_per_page;
    let x2 = ads_per_page / rng.gen_range(1.0..=config.jitter_divide) - ads_per_page;
    let x3 = f64::from(rng.gen_range(0..=config.jitter_add_ads));
    let x4 = -f64::from(rng.gen_range(0..=config.jitter_subtract_ads));
    ads_per_page + x1 + x2 + x3 + x4
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_page_size(ads_per_page: f64, config: &PagingConfig) -> u32 {
    (ads_per_page as i64)
        .clamp(i64::from(config.min_ads_per_page), i64::from(config.max_ads_per_page))
        as u32
}
