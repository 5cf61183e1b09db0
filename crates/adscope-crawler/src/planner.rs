//! Experiment planning.
//!
//! Turns a named preset from the configuration into an experiment spec and
//! its initial split tasks. An experiment is partitioned into splits either
//! by country or by advertiser page id; each split becomes an independent
//! task lineage starting at page zero.

use adscope_core::config::CrawlConfig;
use adscope_core::error::ConfigError;
use adscope_core::spec::{
    AttemptSpec, Continuation, ExperimentSpec, PageSpec, SplitSpec, TaskSpecs,
};
use chrono::Utc;
use std::path::Path;

use crate::error::Result;

/// Build an experiment spec from a named preset.
///
/// The experiment folder is stamped with the creation time so repeated runs
/// of the same preset land in distinct folders. A priority override, when
/// given, replaces the preset's priority for every task of the experiment.
pub fn create_experiment(
    config: &CrawlConfig,
    experiment_type: &str,
    priority_override: Option<i64>,
) -> Result<ExperimentSpec> {
    let preset = config.experiment(experiment_type)?;
    let experiment_key = experiment_type.to_lowercase();

    let root_folder = match &preset.root_folder {
        Some(folder) => folder.clone(),
        None => config.downloads_dir()?,
    };
    let timestamp = Utc::now().format("%Y-%m-%d-%H-%M-%S");
    let experiment_folder = root_folder
        .join(format!("{experiment_key}--{timestamp}"))
        .to_string_lossy()
        .into_owned();

    let mut advertisers = preset.advertisers.clone();
    if let Some(report) = &preset.advertisers_from_report {
        advertisers.extend(read_advertiser_report(report)?);
    }

    Ok(ExperimentSpec {
        experiment_key,
        experiment_folder,
        task_priority: priority_override.unwrap_or(preset.task_priority),
        ad_type: preset.ad_type.clone(),
        ad_active_status: preset.ad_active_status.clone(),
        ad_fields: preset.ad_fields.clone(),
        countries: preset.countries.clone(),
        search_terms: preset.search_terms.clone(),
        advertisers,
        platforms: preset.platforms.clone(),
        last_n_days: preset.last_n_days,
        ads_per_page: preset.ads_per_page,
        countries_per_split: preset.countries_per_split,
        advertisers_per_split: preset.advertisers_per_split,
        search_by_advertisers: preset.search_by_advertisers,
    })
}

/// Partition an experiment's target set into splits.
///
/// Advertiser-mode experiments split the advertiser list, country-mode
/// experiments the country list; either way the last split takes the
/// remainder.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn create_splits(experiment: &ExperimentSpec) -> Vec<SplitSpec> {
    if experiment.search_by_advertisers {
        let per_split = experiment.advertisers_per_split.max(1);
        let chunks: Vec<_> = experiment.advertisers.chunks(per_split).collect();
        let split_count = chunks.len() as u32;
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, advertisers)| SplitSpec {
                split_index: index as u32,
                split_count,
                countries: vec![],
                advertisers: advertisers.to_vec(),
            })
            .collect()
    } else {
        let per_split = experiment.countries_per_split.max(1);
        let chunks: Vec<_> = experiment.countries.chunks(per_split).collect();
        let split_count = chunks.len() as u32;
        chunks
            .into_iter()
            .enumerate()
            .map(|(index, countries)| SplitSpec {
                split_index: index as u32,
                split_count,
                countries: countries.to_vec(),
                advertisers: vec![],
            })
            .collect()
    }
}

/// Compose the initial task for one split: page zero, attempt zero, an
/// empty continuation.
#[must_use]
pub fn initial_task(experiment: &ExperimentSpec, split: SplitSpec) -> TaskSpecs {
    TaskSpecs {
        experiment: experiment.clone(),
        split,
        page: PageSpec::default(),
        attempt: AttemptSpec::default(),
        continuation: Continuation::default(),
    }
}

/// Compose the initial tasks for every split of an experiment.
#[must_use]
pub fn initial_tasks(experiment: &ExperimentSpec) -> Vec<TaskSpecs> {
    create_splits(experiment)
        .into_iter()
        .map(|split| initial_task(experiment, split))
        .collect()
}

/// Read advertiser page ids from a report file, one per line.
///
/// The provider's exported reports start with a `Page ID` header and a
/// UTF-8 BOM; both are tolerated and stripped.
fn read_advertiser_report(path: &Path) -> Result<Vec<String>> {
    let contents = std::fs::read_to_string(path)?;
    let mut lines = contents.lines();

    let header = lines
        .next()
        .map(|line| line.trim_start_matches('\u{feff}').trim())
        .unwrap_or_default();
    if header != "Page ID" {
        return Err(ConfigError::InvalidValue {
            field: "advertisers_from_report".to_string(),
            reason: format!("expected 'Page ID' header, found '{header}'"),
        }
        .into());
    }

    Ok(lines
        .map(|line| line.split(',').next().unwrap_or(line).trim().to_string())
        .filter(|line| !line.is_empty())
        .collect())
}
