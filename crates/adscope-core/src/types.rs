//! Shared types used across the adscope crawl engine.
//!
//! This module defines common newtypes that provide type safety and clear
//! domain modeling for the queue and continuation machinery.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Newtype for the queue's monotonically assigned task keys.
///
/// Task keys are the SQLite rowid of the queue table: positive, unique,
/// and never reused within one queue database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskKey(i64);

impl TaskKey {
    /// Wrap a raw key value.
    #[must_use]
    pub fn new(key: i64) -> Self {
        Self(key)
    }

    /// Get the inner key value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<i64> for TaskKey {
    fn from(key: i64) -> Self {
        Self(key)
    }
}

/// Integer outcome classifier for one executed attempt.
///
/// The numeric bands follow the archive provider's conventions:
///
/// - `0`: success, more pages are available
/// - `-1`: clean end of pagination for this split
/// - positive: a provider-reported error code (`190` is the expired-token
///   class and is handled specially by the continuation policy)
/// - other negative: transport or parse level failure on our side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FinishCode(i64);

impl FinishCode {
    /// Success; the response carried a next-page cursor.
    pub const SUCCESS: Self = Self(0);
    /// Clean end of pagination; no further task for this split.
    pub const END_OF_PAGES: Self = Self(-1);
    /// Provider error class for expired access tokens.
    pub const EXPIRED_TOKEN: Self = Self(190);
    /// The HTTP request itself failed (connection refused, DNS, timeout).
    pub const CONNECTION_FAILED: Self = Self(-10_001);
    /// The provider returned an HTML document where JSON was expected.
    pub const UNEXPECTED_HTML: Self = Self(-10_002);
    /// The response parsed but carried neither data nor an error object.
    pub const EMPTY_RESPONSE: Self = Self(-10_003);

    /// Wrap a raw finish code.
    #[must_use]
    pub fn new(code: i64) -> Self {
        Self(code)
    }

    /// Get the inner code value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }

    /// True for code 0 (success with more pages).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    /// True for code -1 (clean end of pagination).
    #[must_use]
    pub fn is_end_of_pages(&self) -> bool {
        self.0 == -1
    }

    /// True for the expired-token provider error class.
    #[must_use]
    pub fn is_expired_token(&self) -> bool {
        self.0 == 190
    }

    /// True for any positive provider error code.
    #[must_use]
    pub fn is_provider_error(&self) -> bool {
        self.0 > 0
    }

    /// True for transport/parse failures (negative, other than -1).
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        self.0 < -1
    }
}

impl fmt::Display for FinishCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for FinishCode {
    fn from(code: i64) -> Self {
        Self(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_key_display() {
        assert_eq!(TaskKey::new(42).to_string(), "#42");
    }

    #[test]
    fn test_finish_code_classification() {
        assert!(FinishCode::SUCCESS.is_success());
        assert!(FinishCode::END_OF_PAGES.is_end_of_pages());
        assert!(FinishCode::EXPIRED_TOKEN.is_expired_token());
        assert!(FinishCode::EXPIRED_TOKEN.is_provider_error());
        assert!(FinishCode::new(4).is_provider_error());
        assert!(FinishCode::CONNECTION_FAILED.is_transport_error());
        assert!(!FinishCode::END_OF_PAGES.is_transport_error());
        assert!(!FinishCode::SUCCESS.is_provider_error());
    }

    #[test]
    fn test_finish_code_serialization() {
        let code = FinishCode::new(190);
        let json = serde_json::to_string(&code).expect("serialize finish code");
        assert_eq!(json, "190");

        let parsed: FinishCode = serde_json::from_str(&json).expect("deserialize finish code");
        assert_eq!(parsed, code);
    }
}
