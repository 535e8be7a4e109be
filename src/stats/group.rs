//! Frequency, coefficient of variation and maximum per feature and group.

use crate::data::{is_detected, FeatureTable, GroupMembership, Metric, MetricSet};
use crate::error::Result;
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Standard deviation estimator used for the coefficient of variation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Dispersion {
    /// Sample standard deviation (n - 1 denominator).
    #[default]
    Sample,
    /// Population standard deviation (n denominator).
    Population,
}

/// Configuration for group statistics.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Standard deviation estimator for CV.
    #[serde(default)]
    pub dispersion: Dispersion,
}

/// Compute the metrics of one feature over the values of one group.
///
/// * frequency: detected (present, non-zero) values / group size.
/// * cv: standard deviation / mean of the present values, zeros included.
/// * max: largest present value.
///
/// An empty group yields undefined metrics. A zero mean yields an undefined
/// CV, as does a sample too small for the chosen estimator.
pub fn compute_metric_set(values: &[Option<f64>], dispersion: Dispersion) -> MetricSet {
    if values.is_empty() {
        return MetricSet::undefined();
    }

    let n_detected = values.iter().filter(|&&v| is_detected(v)).count();
    let frequency = Metric::Defined(n_detected as f64 / values.len() as f64);

    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return MetricSet {
            frequency,
            cv: Metric::Undefined,
            max_value: Metric::Undefined,
        };
    }

    let max_value = Metric::from_f64(present.iter().copied().fold(f64::NEG_INFINITY, f64::max));

    let mean = present.iter().mean();
    let cv = if mean == 0.0 {
        Metric::Undefined
    } else {
        let std_dev = match dispersion {
            Dispersion::Sample => present.iter().std_dev(),
            Dispersion::Population => present.iter().population_std_dev(),
        };
        Metric::from_f64(std_dev / mean.abs())
    };

    MetricSet {
        frequency,
        cv,
        max_value,
    }
}

/// Compute group metrics with the default configuration.
///
/// See [`compute_group_metrics_with`].
pub fn compute_group_metrics<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
) -> Result<FeatureTable> {
    compute_group_metrics_with(table, membership, &StatsConfig::default())
}

/// Compute frequency, CV and max for every feature and every group label of
/// the classification.
///
/// Returns a new table whose sample columns are classified by `membership`
/// and whose metric columns are replaced by the freshly computed ones. Raw
/// values are untouched. Unclassified samples take part in no group.
pub fn compute_group_metrics_with<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    config: &StatsConfig,
) -> Result<FeatureTable> {
    let mut result = table.clone().classify(membership).without_metrics();
    let groups = membership.groups();

    for group in &groups {
        let cols = result.group_columns(group);
        if cols.is_empty() {
            warn!("Group '{}' has no samples in the table; its metrics are undefined", group);
        } else {
            debug!("Group '{}': {} samples", group, cols.len());
        }

        let metrics: Vec<MetricSet> = (0..result.n_features())
            .into_par_iter()
            .map(|row| {
                let values: Vec<Option<f64>> = cols.iter().map(|&col| result.get(row, col)).collect();
                compute_metric_set(&values, config.dispersion)
            })
            .collect();

        result = result.with_metrics(group, metrics)?;
    }

    info!(
        "Computed frequency, CV and max for {} group(s) over {} features",
        groups.len(),
        result.n_features()
    );
    Ok(result)
}
