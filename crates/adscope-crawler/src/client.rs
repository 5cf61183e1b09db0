//! The archive client seam.
//!
//! The engine never talks to the network itself; it hands a task description
//! to an [`AdArchiveClient`] and gets back a [`FetchOutcome`] whose finish
//! code and finish log feed the continuation policy. `GraphClient` is the
//! production implementation against a Graph-API-style ad archive endpoint;
//! tests substitute scripted fakes.

use adscope_core::config::ClientConfig;
use adscope_core::spec::{FinishLog, TaskSpecs};
use adscope_core::types::FinishCode;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Url;

use crate::error::{CrawlError, Result};

/// Structured result of one executed attempt.
///
/// Everything the driver needs: the classification for the continuation
/// policy, the log for `amend`, and the request/response metadata for the
/// downloads archive.
#[derive(Debug, Clone)]
pub struct FetchOutcome {
    /// Outcome classifier (see [`FinishCode`] for the bands).
    pub finish_code: FinishCode,
    /// Structured outcome, including the updated continuation.
    pub finish_log: FinishLog,
    /// Full request URL that was sent.
    pub request_url: String,
    /// When the request was sent.
    pub requested_at: DateTime<Utc>,
    /// When the response arrived, if one did.
    pub responded_at: Option<DateTime<Utc>>,
    /// Round-trip time in seconds, if a response arrived.
    pub duration_secs: Option<f64>,
    /// Raw response body, when one was received.
    pub response_body: Option<String>,
    /// Transport error text when no response arrived.
    pub response_error: Option<String>,
}

/// A paginated ad archive endpoint.
///
/// Implementations perform exactly one page fetch per call and never retry
/// internally; retry is the continuation policy's decision, not the
/// transport's.
#[async_trait]
pub trait AdArchiveClient: Send + Sync {
    /// Fetch one page for the given task.
    ///
    /// Transport failures are not errors here: they come back as a
    /// [`FetchOutcome`] with a transport-class finish code, because the
    /// engine treats them as data.
    async fn fetch_page(&self, specs: &TaskSpecs, access_token: &str) -> FetchOutcome;
}

/// Source of the current archive access token.
pub trait TokenProvider: Send + Sync {
    /// Return the token to use for the next request.
    fn access_token(&self) -> Result<String>;
}

/// Token provider backed by a fixed string (config or environment).
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wrap a fixed token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl TokenProvider for StaticTokenProvider {
    fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

/// HTTP client for a Graph-API-style ad archive endpoint.
pub struct GraphClient {
    client: reqwest::Client,
    base_url: String,
}

impl GraphClient {
    /// Create a client from endpoint configuration.
    ///
    /// # Errors
    /// Returns `CrawlError::Http` if the HTTP client cannot be created.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CrawlError::Http(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
        })
    }

    /// Build the page request URL from the merged task specs.
    ///
    /// # Errors
    /// Returns `CrawlError::Http` if the base URL does not parse.
    pub fn build_url(&self, specs: &TaskSpecs, access_token: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CrawlError::Http(format!("invalid base URL: {e}")))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("access_token", access_token);
            query.append_pair("ad_type", &specs.experiment.ad_type);
            query.append_pair("ad_active_status", &specs.experiment.ad_active_status);
            query.append_pair("fields", &specs.experiment.ad_fields.join(","));
            query.append_pair("platforms", &specs.experiment.platforms.join(","));
            query.append_pair("ad_reached_countries", &specs.countries().join(","));
            query.append_pair("limit", &specs.ads_per_page().to_string());

            if specs.experiment.search_by_advertisers {
                query.append_pair("search_page_ids", &specs.advertisers().join(","));
            } else {
                query.append_pair("search_terms", &specs.experiment.search_terms.join(" "));
            }

            query.append_pair(
                "impression_condition",
                impression_condition(specs.experiment.last_n_days),
            );

            if let Some(after) = specs.after_token() {
                query.append_pair("after", after);
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl AdArchiveClient for GraphClient {
    async fn fetch_page(&self, specs: &TaskSpecs, access_token: &str) -> FetchOutcome {
        let requested_at = Utc::now();
        let url = match self.build_url(specs, access_token) {
            Ok(url) => url,
            Err(e) => {
                return transport_failure(
                    specs,
                    access_token,
                    self.base_url.clone(),
                    requested_at,
                    &e.to_string(),
                );
            }
        };
        let request_url = url.to_string();

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Archive request failed: {}", e);
                return transport_failure(
                    specs,
                    access_token,
                    request_url,
                    requested_at,
                    &e.to_string(),
                );
            }
        };

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!("Failed to read archive response: {}", e);
                return transport_failure(
                    specs,
                    access_token,
                    request_url,
                    requested_at,
                    &e.to_string(),
                );
            }
        };

        let responded_at = Utc::now();
        let duration_secs = (responded_at - requested_at).num_milliseconds() as f64 / 1000.0;

        let (finish_code, finish_log) = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => classify_response(specs, access_token, &value),
            Err(_) => {
                // The provider serves an HTML error page when it is unhappy
                // with the request rate or the session
                tracing::warn!("Archive returned a non-JSON document");
                let mut log = FinishLog {
                    access_token: Some(access_token.to_string()),
                    note: Some("response body was not JSON".to_string()),
                    continuation: specs.continuation.clone(),
                    ..FinishLog::default()
                };
                log.ad_count = Some(0);
                (FinishCode::UNEXPECTED_HTML, log)
            }
        };

        FetchOutcome {
            finish_code,
            finish_log,
            request_url,
            requested_at,
            responded_at: Some(responded_at),
            duration_secs: Some(duration_secs),
            response_body: Some(body),
            response_error: None,
        }
    }
}

fn transport_failure(
    specs: &TaskSpecs,
    access_token: &str,
    request_url: String,
    requested_at: DateTime<Utc>,
    error: &str,
) -> FetchOutcome {
    FetchOutcome {
        finish_code: FinishCode::CONNECTION_FAILED,
        finish_log: FinishLog {
            access_token: Some(access_token.to_string()),
            ad_count: Some(0),
            note: Some("request failed before a response arrived".to_string()),
            continuation: specs.continuation.clone(),
            ..FinishLog::default()
        },
        request_url,
        requested_at,
        responded_at: None,
        duration_secs: None,
        response_body: None,
        response_error: Some(error.to_string()),
    }
}

/// Classify a parsed response body into a finish code and log.
///
/// A body with data and a next-page cursor is a success; with data but no
/// cursor it is the terminal page; an error object maps to its provider
/// code; anything else is the empty-response failure class.
fn classify_response(
    specs: &TaskSpecs,
    access_token: &str,
    body: &serde_json::Value,
) -> (FinishCode, FinishLog) {
    let mut log = FinishLog {
        access_token: Some(access_token.to_string()),
        continuation: specs.continuation.clone(),
        ..FinishLog::default()
    };

    if let Some(data) = body.get("data").and_then(|d| d.as_array()) {
        let ad_count = i64::try_from(data.len()).unwrap_or(i64::MAX);
        log.ad_count = Some(ad_count);
        log.continuation.total_ad_count += ad_count.unsigned_abs();

        let cursor = body
            .pointer("/paging/cursors/after")
            .and_then(|c| c.as_str());

        if let Some(cursor) = cursor {
            log.paging_cursor = Some(cursor.to_string());
            log.continuation.after_token = Some(cursor.to_string());
            tracing::info!(
                "Received a page of {} ads ({} total)",
                ad_count,
                log.continuation.total_ad_count
            );
            (FinishCode::SUCCESS, log)
        } else {
            tracing::info!(
                "Received the final page of {} ads ({} total)",
                ad_count,
                log.continuation.total_ad_count
            );
            (FinishCode::END_OF_PAGES, log)
        }
    } else if let Some(error) = body.get("error") {
        let error_code = error.get("code").and_then(serde_json::Value::as_i64);
        let error_message = error
            .get("message")
            .and_then(|m| m.as_str())
            .map(ToString::to_string);

        log.ad_count = Some(0);
        log.error_code = error_code;
        log.error_message = error_message.clone();
        tracing::warn!(
            "Archive error {}: {}",
            error_code.unwrap_or(-1),
            error_message.as_deref().unwrap_or("(no message)")
        );

        match error_code {
            Some(code) => (FinishCode::new(code), log),
            None => (FinishCode::EMPTY_RESPONSE, log),
        }
    } else {
        log.ad_count = Some(0);
        log.note = Some("response carried neither data nor an error object".to_string());
        tracing::warn!("Archive response carried neither data nor an error object");
        (FinishCode::EMPTY_RESPONSE, log)
    }
}

/// Map the impression window in days onto the provider's filter values.
fn impression_condition(last_n_days: i64) -> &'static str {
    if last_n_days <= 0 {
        "HAS_IMPRESSIONS_LIFETIME"
    } else if last_n_days <= 1 {
        "HAS_IMPRESSIONS_YESTERDAY"
    } else if last_n_days <= 7 {
        "HAS_IMPRESSIONS_LAST_7_DAYS"
    } else if last_n_days <= 30 {
        "HAS_IMPRESSIONS_LAST_30_DAYS"
    } else if last_n_days <= 90 {
        "HAS_IMPRESSIONS_LAST_90_DAYS"
    } else {
        "HAS_IMPRESSIONS_LIFETIME"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adscope_core::spec::{
        AttemptSpec, Continuation, ExperimentSpec, PageSpec, SplitSpec,
    };
    use serde_json::json;

    fn sample_specs() -> TaskSpecs {
        TaskSpecs {
            experiment: ExperimentSpec {
                experiment_key: "us".to_string(),
                experiment_folder: "/data/us--2026-08-01-00-00-00".to_string(),
                task_priority: 5,
                ad_type: "POLITICAL_AND_ISSUE_ADS".to_string(),
                ad_active_status: "ALL".to_string(),
                ad_fields: vec!["id".to_string(), "page_id".to_string()],
                countries: vec!["US".to_string()],
                search_terms: vec![String::new()],
                advertisers: vec![],
                platforms: vec![],
                last_n_days: 7,
                ads_per_page: 250,
                countries_per_split: 1,
                advertisers_per_split: 10,
                search_by_advertisers: false,
            },
            split: SplitSpec {
                split_index: 0,
                split_count: 1,
                countries: vec!["US".to_string()],
                advertisers: vec![],
            },
            page: PageSpec::default(),
            attempt: AttemptSpec::default(),
            continuation: Continuation::default(),
        }
    }

    fn graph_client() -> GraphClient {
        GraphClient::new(&ClientConfig::default()).expect("create client")
    }

    #[test]
    fn test_build_url_basic_params() {
        let specs = sample_specs();
        let url = graph_client()
            .build_url(&specs, "token-xyz")
            .expect("build URL");
        let query = url.query().expect("query string");

        assert!(query.contains("access_token=token-xyz"));
        assert!(query.contains("ad_type=POLITICAL_AND_ISSUE_ADS"));
        assert!(query.contains("fields=id%2Cpage_id"));
        assert!(query.contains("ad_reached_countries=US"));
        assert!(query.contains("limit=250"));
        assert!(query.contains("impression_condition=HAS_IMPRESSIONS_LAST_7_DAYS"));
        assert!(query.contains("search_terms="));
        assert!(!query.contains("after="));
        assert!(!query.contains("search_page_ids="));
    }

    #[test]
    fn test_build_url_resumes_from_cursor() {
        let mut specs = sample_specs();
        specs.continuation.after_token = Some("cursor-123".to_string());
        specs.attempt.ads_per_page = Some(119);

        let url = graph_client()
            .build_url(&specs, "token")
            .expect("build URL");
        let query = url.query().expect("query string");

        assert!(query.contains("after=cursor-123"));
        // The attempt-level page size overrides the experiment default
        assert!(query.contains("limit=119"));
    }

    #[test]
    fn test_build_url_advertiser_mode() {
        let mut specs = sample_specs();
        specs.experiment.search_by_advertisers = true;
        specs.split.advertisers = vec!["111".to_string(), "222".to_string()];

        let url = graph_client()
            .build_url(&specs, "token")
            .expect("build URL");
        let query = url.query().expect("query string");

        assert!(query.contains("search_page_ids=111%2C222"));
        assert!(!query.contains("search_terms="));
    }

    #[test]
    fn test_classify_success_page() {
        let specs = sample_specs();
        let body = json!({
            "data": [{"id": "1"}, {"id": "2"}],
            "paging": {"cursors": {"after": "next-cursor"}}
        });

        let (code, log) = classify_response(&specs, "token", &body);

        assert_eq!(code, FinishCode::SUCCESS);
        assert_eq!(log.ad_count, Some(2));
        assert_eq!(log.paging_cursor.as_deref(), Some("next-cursor"));
        assert_eq!(log.continuation.after_token.as_deref(), Some("next-cursor"));
        assert_eq!(log.continuation.total_ad_count, 2);
        assert_eq!(log.access_token.as_deref(), Some("token"));
    }

    #[test]
    fn test_classify_accumulates_ad_total() {
        let mut specs = sample_specs();
        specs.continuation.total_ad_count = 500;
        let body = json!({
            "data": [{"id": "1"}],
            "paging": {"cursors": {"after": "next"}}
        });

        let (_, log) = classify_response(&specs, "token", &body);
        assert_eq!(log.continuation.total_ad_count, 501);
    }

    #[test]
    fn test_classify_terminal_page() {
        let specs = sample_specs();
        let body = json!({"data": [{"id": "1"}]});

        let (code, log) = classify_response(&specs, "token", &body);

        assert_eq!(code, FinishCode::END_OF_PAGES);
        assert_eq!(log.ad_count, Some(1));
        assert!(log.paging_cursor.is_none());
    }

    #[test]
    fn test_classify_provider_error() {
        let specs = sample_specs();
        let body = json!({
            "error": {"code": 190, "message": "Error validating access token"}
        });

        let (code, log) = classify_response(&specs, "token", &body);

        assert_eq!(code, FinishCode::EXPIRED_TOKEN);
        assert_eq!(log.error_code, Some(190));
        assert_eq!(
            log.error_message.as_deref(),
            Some("Error validating access token")
        );
        assert_eq!(log.ad_count, Some(0));
    }

    #[test]
    fn test_classify_empty_response() {
        let specs = sample_specs();
        let body = json!({"unexpected": true});

        let (code, log) = classify_response(&specs, "token", &body);

        assert_eq!(code, FinishCode::EMPTY_RESPONSE);
        assert_eq!(log.ad_count, Some(0));
        assert!(log.note.is_some());
    }

    #[test]
    fn test_impression_condition_tiers() {
        assert_eq!(impression_condition(-1), "HAS_IMPRESSIONS_LIFETIME");
        assert_eq!(impression_condition(1), "HAS_IMPRESSIONS_YESTERDAY");
        assert_eq!(impression_condition(7), "HAS_IMPRESSIONS_LAST_7_DAYS");
        assert_eq!(impression_condition(30), "HAS_IMPRESSIONS_LAST_30_DAYS");
        assert_eq!(impression_condition(90), "HAS_IMPRESSIONS_LAST_90_DAYS");
        assert_eq!(impression_condition(365), "HAS_IMPRESSIONS_LIFETIME");
    }
}
