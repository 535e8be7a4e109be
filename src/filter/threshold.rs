//! Frequency (and optional CV) threshold filtering on a reference group.

use crate::data::{FeatureTable, GroupMembership, Metric};
use crate::error::{BolflowError, Result};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Default CV ceiling applied when CV filtering is enabled.
pub const DEFAULT_MAX_CV: f64 = 0.30;

/// Slack on the frequency comparison so that a frequency equal to the
/// threshold is not lost to rounding (29 / 50 * 100 == 57.99999999999999).
const FREQUENCY_TOLERANCE: f64 = 1e-9;

pub(crate) fn default_max_cv() -> f64 {
    DEFAULT_MAX_CV
}

/// Parameters of the threshold filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Group whose metrics decide retention (e.g. "QC").
    pub group_type: String,
    /// Minimum detection frequency, in percent.
    pub threshold_percent: f64,
    /// Also require a defined CV no larger than `max_cv`.
    #[serde(default)]
    pub use_cv: bool,
    /// CV ceiling used when `use_cv` is set.
    #[serde(default = "default_max_cv")]
    pub max_cv: f64,
}

impl FilterSpec {
    /// Frequency-only filter on `group_type`.
    pub fn new(group_type: &str, threshold_percent: f64) -> Self {
        Self {
            group_type: group_type.to_string(),
            threshold_percent,
            use_cv: false,
            max_cv: DEFAULT_MAX_CV,
        }
    }

    /// Enable the CV criterion with the given ceiling.
    pub fn with_cv(mut self, max_cv: f64) -> Self {
        self.use_cv = true;
        self.max_cv = max_cv;
        self
    }

    /// Check the numeric parameters.
    pub fn validate(&self) -> Result<()> {
        if !self.threshold_percent.is_finite() || !(0.0..=100.0).contains(&self.threshold_percent) {
            return Err(BolflowError::InvalidThreshold(format!(
                "frequency threshold must be between 0 and 100, got {}",
                self.threshold_percent
            )));
        }
        if !self.max_cv.is_finite() || self.max_cv < 0.0 {
            return Err(BolflowError::InvalidThreshold(format!(
                "CV ceiling must be a non-negative number, got {}",
                self.max_cv
            )));
        }
        Ok(())
    }

    fn passes(&self, frequency: Metric, cv: Metric) -> bool {
        let frequent = match frequency {
            Metric::Defined(f) => f * 100.0 + FREQUENCY_TOLERANCE >= self.threshold_percent,
            Metric::Undefined => false,
        };
        frequent && (!self.use_cv || cv.at_most(self.max_cv))
    }
}

/// Summary of a filtering pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterResult {
    /// Number of features before filtering.
    pub n_before: usize,
    /// Number of features after filtering.
    pub n_after: usize,
    /// Number of features removed.
    pub n_removed: usize,
    /// Proportion of features retained.
    pub retention_rate: f64,
}

impl std::fmt::Display for FilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Filter Result")?;
        writeln!(f, "  Before:    {} features", self.n_before)?;
        writeln!(f, "  After:     {} features", self.n_after)?;
        writeln!(f, "  Removed:   {} features", self.n_removed)?;
        writeln!(f, "  Retained:  {:.1}%", self.retention_rate * 100.0)?;
        Ok(())
    }
}

/// Keep features whose metrics in `spec.group_type` pass the threshold.
///
/// A feature is retained iff its frequency in the group, in percent, is at
/// least `threshold_percent` and, when `use_cv` is set, its CV is defined and
/// at most `max_cv`. Undefined metrics never pass. An empty result is not an
/// error.
///
/// # Errors
/// * `InvalidThreshold` for a threshold outside [0, 100] or a bad CV ceiling.
/// * `UnknownGroupType` if the group is not a classification label.
/// * `MissingMetrics` if the table carries no metrics for the group.
pub fn filter_by_threshold<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    spec: &FilterSpec,
) -> Result<FeatureTable> {
    spec.validate()?;
    if !membership.has_group(&spec.group_type) {
        return Err(BolflowError::UnknownGroupType(spec.group_type.clone()));
    }
    let metrics = table
        .metrics(&spec.group_type)
        .ok_or_else(|| BolflowError::MissingMetrics(spec.group_type.clone()))?;

    let keep_indices: Vec<usize> = (0..table.n_features())
        .into_par_iter()
        .filter(|&row| spec.passes(metrics[row].frequency, metrics[row].cv))
        .collect();

    if keep_indices.is_empty() && table.n_features() > 0 {
        warn!(
            "No features pass the {}% frequency threshold in group '{}'",
            spec.threshold_percent, spec.group_type
        );
    }

    let filtered = table.subset_features(&keep_indices)?;
    info!(
        "Threshold filter on '{}' ({}%{}): kept {} of {} features",
        spec.group_type,
        spec.threshold_percent,
        if spec.use_cv {
            format!(", CV <= {}", spec.max_cv)
        } else {
            String::new()
        },
        filtered.n_features(),
        table.n_features()
    );
    Ok(filtered)
}

/// Filter with statistics about what was filtered.
pub fn filter_by_threshold_with_stats<M: GroupMembership + ?Sized>(
    table: &FeatureTable,
    membership: &M,
    spec: &FilterSpec,
) -> Result<(FeatureTable, FilterResult)> {
    let n_before = table.n_features();
    let filtered = filter_by_threshold(table, membership, spec)?;
    let n_after = filtered.n_features();

    let result = FilterResult {
        n_before,
        n_after,
        n_removed: n_before - n_after,
        retention_rate: if n_before == 0 {
            1.0
        } else {
            n_after as f64 / n_before as f64
        },
    };

    Ok((filtered, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Classification, MetricSet, SampleColumn};
    use crate::stats::compute_group_metrics;

    fn create_test_classification() -> Classification {
        let mut cls = Classification::new();
        for i in 1..=4 {
            cls.insert(&format!("QC{}", i), ["QC"], Some(i as f64)).unwrap();
            cls.insert(&format!("S{}", i), ["S"], Some(4.0 + i as f64)).unwrap();
        }
        cls
    }

    fn create_test_table() -> FeatureTable {
        let cls = create_test_classification();
        let samples = ["QC1", "QC2", "QC3", "QC4", "S1", "S2", "S3", "S4"];
        let columns = samples.iter().map(|s| SampleColumn::unclassified(s)).collect();
        let some = |v: [f64; 8]| v.iter().map(|&x| Some(x)).collect::<Vec<_>>();
        let table = FeatureTable::from_rows(
            vec!["M1".into(), "M2".into(), "M3".into(), "M4".into()],
            columns,
            &[
                // QC constant, S sparse
                some([10.0, 10.0, 10.0, 10.0, 0.0, 0.0, 5.0, 0.0]),
                // QC 3 of 4, noisy
                some([1.0, 10.0, 0.0, 20.0, 1.0, 1.0, 1.0, 1.0]),
                // absent in QC
                some([0.0, 0.0, 0.0, 0.0, 3.0, 3.0, 3.0, 3.0]),
                // QC 2 of 4
                some([0.0, 8.0, 8.0, 0.0, 2.0, 2.0, 0.0, 0.0]),
            ],
        )
        .unwrap();
        compute_group_metrics(&table, &cls).unwrap()
    }

    #[test]
    fn test_qc_constant_is_retained() {
        let cls = create_test_classification();
        let table = create_test_table();

        for threshold in [50.0, 100.0] {
            let result = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", threshold)).unwrap();
            assert!(result.feature_ids().contains(&"M1".to_string()));
        }
    }

    #[test]
    fn test_sparse_group_threshold() {
        let cls = create_test_classification();
        let table = create_test_table();

        // M1 has frequency 0.25 in S
        let strict = filter_by_threshold(&table, &cls, &FilterSpec::new("S", 50.0)).unwrap();
        assert!(!strict.feature_ids().contains(&"M1".to_string()));

        let lenient = filter_by_threshold(&table, &cls, &FilterSpec::new("S", 20.0)).unwrap();
        assert!(lenient.feature_ids().contains(&"M1".to_string()));
    }

    #[test]
    fn test_frequency_boundary_is_inclusive() {
        let cls = create_test_classification();
        let table = create_test_table();

        let result = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", 75.0)).unwrap();
        assert_eq!(result.feature_ids(), &["M1", "M2"]);

        let result = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", 50.0)).unwrap();
        assert_eq!(result.feature_ids(), &["M1", "M2", "M4"]);
    }

    #[test]
    fn test_boundary_survives_rounding() {
        // (n_samples, n_detected) pairs whose ratio times 100 rounds below the threshold
        for (n, detected, threshold) in [(50, 29, 58.0), (100, 57, 57.0), (10, 7, 70.0)] {
            let mut cls = Classification::new();
            let mut columns = Vec::new();
            let mut row = Vec::new();
            for i in 0..n {
                let id = format!("QC{}", i + 1);
                cls.insert(&id, ["QC"], Some(i as f64)).unwrap();
                columns.push(SampleColumn::unclassified(&id));
                row.push(Some(if i < detected { 1.0 } else { 0.0 }));
            }
            let table = FeatureTable::from_rows(vec!["M1".into()], columns, &[row]).unwrap();
            let table = compute_group_metrics(&table, &cls).unwrap();

            let kept = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", threshold)).unwrap();
            assert_eq!(kept.n_features(), 1, "{} of {} at {}%", detected, n, threshold);

            let above = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", threshold + 0.01)).unwrap();
            assert_eq!(above.n_features(), 0);
        }
    }

    #[test]
    fn test_cv_criterion() {
        let cls = create_test_classification();
        let table = create_test_table();

        let spec = FilterSpec::new("QC", 50.0).with_cv(0.30);
        let result = filter_by_threshold(&table, &cls, &spec).unwrap();

        // M2 and M4 are frequent enough but noisy
        assert!(result.feature_ids().contains(&"M1".to_string()));
        assert!(!result.feature_ids().contains(&"M2".to_string()));
        assert_eq!(result.n_features(), 1);
    }

    #[test]
    fn test_undefined_never_passes() {
        let cls = create_test_classification();
        let table = create_test_table();
        let mut sets = table.metrics("QC").unwrap().to_vec();
        sets[0] = MetricSet::undefined();
        let table = table.with_metrics("QC", sets).unwrap();

        let result = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", 0.0)).unwrap();
        assert!(!result.feature_ids().contains(&"M1".to_string()));
        assert_eq!(result.n_features(), 3);
    }

    #[test]
    fn test_monotonic_in_threshold() {
        let cls = create_test_classification();
        let table = create_test_table();

        let mut previous = usize::MAX;
        for threshold in [0.0, 10.0, 25.0, 50.0, 60.0, 75.0, 90.0, 100.0] {
            let n = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", threshold))
                .unwrap()
                .n_features();
            assert!(n <= previous);
            previous = n;
        }
    }

    #[test]
    fn test_empty_result_is_not_an_error() {
        let cls = create_test_classification();
        // M3 and M4 only
        let table = create_test_table().subset_features(&[2, 3]).unwrap();

        let (result, stats) =
            filter_by_threshold_with_stats(&table, &cls, &FilterSpec::new("QC", 100.0)).unwrap();
        assert_eq!(result.n_features(), 0);
        assert_eq!(stats.n_removed, 2);
        assert_eq!(result.sample_ids(), table.sample_ids());
    }

    #[test]
    fn test_filter_with_stats() {
        let cls = create_test_classification();
        let table = create_test_table();

        let (_, stats) = filter_by_threshold_with_stats(&table, &cls, &FilterSpec::new("QC", 75.0)).unwrap();
        assert_eq!(stats.n_before, 4);
        assert_eq!(stats.n_after, 2);
        assert_eq!(stats.n_removed, 2);
        assert!((stats.retention_rate - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_invalid_threshold() {
        let cls = create_test_classification();
        let table = create_test_table();

        for spec in [
            FilterSpec::new("QC", -1.0),
            FilterSpec::new("QC", 100.5),
            FilterSpec::new("QC", f64::NAN),
            FilterSpec::new("QC", 50.0).with_cv(-0.1),
        ] {
            assert!(matches!(
                filter_by_threshold(&table, &cls, &spec),
                Err(BolflowError::InvalidThreshold(_))
            ));
        }
    }

    #[test]
    fn test_unknown_group() {
        let cls = create_test_classification();
        let table = create_test_table();

        let err = filter_by_threshold(&table, &cls, &FilterSpec::new("blank", 50.0)).unwrap_err();
        assert!(matches!(err, BolflowError::UnknownGroupType(g) if g == "blank"));
    }

    #[test]
    fn test_missing_metrics() {
        let cls = create_test_classification();
        let table = create_test_table().without_metrics();

        let err = filter_by_threshold(&table, &cls, &FilterSpec::new("QC", 50.0)).unwrap_err();
        assert!(matches!(err, BolflowError::MissingMetrics(_)));
    }

    #[test]
    fn test_spec_defaults_from_yaml() {
        let spec: FilterSpec = serde_yaml::from_str("group_type: QC\nthreshold_percent: 80\n").unwrap();
        assert!(!spec.use_cv);
        assert!((spec.max_cv - DEFAULT_MAX_CV).abs() < 1e-10);
    }
}
