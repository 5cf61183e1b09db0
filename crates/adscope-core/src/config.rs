//! Configuration management for adscope.
//!
//! Provides TOML-based configuration with XDG-compliant paths and
//! environment variable overrides. All of the engine's tunable constants
//! (rate-limit quota, paging bounds, retry cap) live here so tests can
//! inject their own values instead of reading ambient globals.

use crate::error::{ConfigError, ConfigResult};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

/// Main application configuration.
///
/// This is loaded from `~/.config/adscope/config.toml` (or platform
/// equivalent). If the file doesn't exist, default values are used.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Outbound request throttling
    pub rate_limit: RateLimitConfig,
    /// Adaptive page-size control
    pub paging: PagingConfig,
    /// Database and download locations
    pub storage: StorageConfig,
    /// Driver loop settings
    pub run: RunConfig,
    /// Archive endpoint settings
    pub client: ClientConfig,
    /// Named experiment presets, keyed by preset name
    pub experiments: HashMap<String, ExperimentPreset>,
}

impl CrawlConfig {
    /// Load configuration from disk, falling back to defaults if not found.
    ///
    /// # Errors
    /// Returns error if:
    /// - Config directory cannot be determined
    /// - File exists but cannot be read
    /// - File contents are not valid TOML
    pub fn load() -> ConfigResult<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            tracing::debug!("Loading config from {}", config_path.display());
            let contents = fs::read_to_string(&config_path)?;
            let config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::debug!("Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load configuration with environment variable overrides.
    ///
    /// Supports the following environment variables:
    /// - `ADSCOPE_DB_DIR`: Override the database directory
    /// - `ADSCOPE_ACCESS_TOKEN`: Override the archive access token
    /// - `ADSCOPE_MAX_ITERATIONS`: Override the driver iteration bound
    pub fn load_with_env() -> ConfigResult<Self> {
        let mut config = Self::load()?;

        if let Ok(val) = std::env::var("ADSCOPE_DB_DIR") {
            config.storage.db_dir = Some(PathBuf::from(&val));
            tracing::debug!("Override storage.db_dir from env: {}", val);
        }

        if let Ok(val) = std::env::var("ADSCOPE_ACCESS_TOKEN") {
            config.run.access_token = Some(val);
            tracing::debug!("Override run.access_token from env");
        }

        if let Ok(val) = std::env::var("ADSCOPE_MAX_ITERATIONS") {
            if let Ok(iterations) = val.parse() {
                config.run.max_iterations = iterations;
                tracing::debug!("Override run.max_iterations from env: {}", iterations);
            }
        }

        Ok(config)
    }

    /// Save configuration to disk.
    ///
    /// Creates the config directory if it doesn't exist.
    pub fn save(&self) -> ConfigResult<()> {
        let config_path = Self::config_path()?;
        let config_dir = config_path
            .parent()
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "config_path".to_string(),
                reason: "no parent directory".to_string(),
            })?;

        fs::create_dir_all(config_dir)?;
        tracing::debug!("Saving config to {}", config_path.display());

        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    ///
    /// Uses XDG base directories: `~/.config/adscope/config.toml`
    pub fn config_path() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "adscope", "adscope").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Get the default data directory path.
    ///
    /// Uses XDG base directories: `~/.local/share/adscope`
    pub fn data_dir() -> ConfigResult<PathBuf> {
        let dirs = ProjectDirs::from("org", "adscope", "adscope").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Resolve the directory holding the queue and rate-limit databases.
    pub fn db_dir(&self) -> ConfigResult<PathBuf> {
        match &self.storage.db_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("db")),
        }
    }

    /// Resolve the root directory for raw downloads.
    pub fn downloads_dir(&self) -> ConfigResult<PathBuf> {
        match &self.storage.downloads_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::data_dir()?.join("downloads")),
        }
    }

    /// Look up an experiment preset by name.
    pub fn experiment(&self, name: &str) -> ConfigResult<&ExperimentPreset> {
        self.experiments
            .get(name)
            .ok_or_else(|| ConfigError::UnknownExperiment(name.to_string()))
    }
}

/// Outbound request throttling against the provider's sliding quota.
///
/// The defaults match the archive's published limit of 50 requests per
/// 15-minute window. The tier caps bound the computed delay while headroom
/// remains; see the rate limiter for how they are applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests allowed per sliding window
    pub requests_per_window: u32,
    /// Sliding window length in seconds
    pub window_secs: u64,
    /// Minimum delay before any request, in seconds
    pub min_delay_secs: f64,
    /// Delay cap while at least 75% of the quota remains
    pub delay_cap_75_secs: f64,
    /// Delay cap while at least 50% of the quota remains
    pub delay_cap_50_secs: f64,
    /// Delay cap while at least 25% of the quota remains
    pub delay_cap_25_secs: f64,
    /// Delay cap while at least 10% of the quota remains
    pub delay_cap_10_secs: f64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 50,
            window_secs: 15 * 60,
            min_delay_secs: 5.0,
            delay_cap_75_secs: 5.0,
            delay_cap_50_secs: 10.0,
            delay_cap_25_secs: 15.0,
            delay_cap_10_secs: 20.0,
        }
    }
}

/// Adaptive page-size control and the bounded-retry cap.
///
/// Page sizes grow by `2^(1/4)` per success and shrink by `2^(-1/2)` per
/// provider failure, with small random jitter so many concurrent crawls
/// don't oscillate in lockstep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    /// Smallest page size ever requested
    pub min_ads_per_page: u32,
    /// Largest page size ever requested
    pub max_ads_per_page: u32,
    /// Multiplicative growth per success
    pub increase_factor: f64,
    /// Multiplicative shrink per provider failure
    pub decrease_factor: f64,
    /// Upper bound of the multiplicative jitter factor
    pub jitter_multiply: f64,
    /// Upper bound of the divisive jitter factor
    pub jitter_divide: f64,
    /// Upper bound of the additive jitter, in ads
    pub jitter_add_ads: u32,
    /// Upper bound of the subtractive jitter, in ads
    pub jitter_subtract_ads: u32,
    /// Attempts at one page before the lineage is marked failed
    pub max_page_attempts: u32,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            min_ads_per_page: 25,
            max_ads_per_page: 5000,
            increase_factor: 1.189_207_115, // 2.0 ^ (1/4)
            decrease_factor: 0.707_106_781_18, // 0.5 ^ (1/2)
            jitter_multiply: 1.025,
            jitter_divide: 1.025,
            jitter_add_ads: 25,
            jitter_subtract_ads: 25,
            max_page_attempts: 10,
        }
    }
}

/// Database and download locations.
///
/// Unset paths resolve under the XDG data directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding the queue and rate-limit databases
    pub db_dir: Option<PathBuf>,
    /// Root directory for raw downloads
    pub downloads_dir: Option<PathBuf>,
}

/// Driver loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Upper bound on driver iterations per invocation
    pub max_iterations: u64,
    /// Archive access token (normally injected via `ADSCOPE_ACCESS_TOKEN`)
    #[serde(skip)]
    pub access_token: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 99_999,
            access_token: None,
        }
    }
}

/// Archive endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the ad archive endpoint
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://graph.facebook.com/v4.0/ads_archive".to_string(),
            timeout_secs: 60,
        }
    }
}

/// One named experiment preset.
///
/// Presets describe what a full crawl of the archive looks like for one
/// region or advertiser set; `adscope add <preset>` turns a preset into an
/// experiment and its initial split tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentPreset {
    /// Queue priority for every task of the experiment
    pub task_priority: i64,
    /// Archive ad type filter
    pub ad_type: String,
    /// Archive active-status filter
    pub ad_active_status: String,
    /// Response fields requested per ad
    pub ad_fields: Vec<String>,
    /// Countries the ads must have reached
    pub countries: Vec<String>,
    /// Full-text search terms
    pub search_terms: Vec<String>,
    /// Advertiser page ids to search by
    pub advertisers: Vec<String>,
    /// File of advertiser page ids, one per line, appended to `advertisers`
    pub advertisers_from_report: Option<PathBuf>,
    /// Platform filter (empty means all platforms)
    pub platforms: Vec<String>,
    /// Impression window in days; non-positive means lifetime
    pub last_n_days: i64,
    /// Starting page size
    pub ads_per_page: u32,
    /// Countries per split when splitting by country
    pub countries_per_split: usize,
    /// Advertisers per split when splitting by advertiser
    pub advertisers_per_split: usize,
    /// Split by advertiser page ids instead of by country
    pub search_by_advertisers: bool,
    /// Root folder for the experiment's downloads (defaults to storage dir)
    pub root_folder: Option<PathBuf>,
}

impl Default for ExperimentPreset {
    fn default() -> Self {
        Self {
            task_priority: 5,
            ad_type: "POLITICAL_AND_ISSUE_ADS".to_string(),
            ad_active_status: "ALL".to_string(),
            ad_fields: vec![
                "id".to_string(),
                "page_id".to_string(),
                "page_name".to_string(),
                "ad_creation_time".to_string(),
                "ad_delivery_start_time".to_string(),
                "ad_delivery_stop_time".to_string(),
                "ad_creative_body".to_string(),
                "ad_snapshot_url".to_string(),
                "currency".to_string(),
                "spend".to_string(),
                "impressions".to_string(),
                "demographic_distribution".to_string(),
                "region_distribution".to_string(),
            ],
            countries: vec!["US".to_string()],
            search_terms: vec![String::new()],
            advertisers: vec![],
            advertisers_from_report: None,
            platforms: vec![],
            last_n_days: -1,
            ads_per_page: 250,
            countries_per_split: 1,
            advertisers_per_split: 10,
            search_by_advertisers: false,
            root_folder: None,
        }
    }
}
