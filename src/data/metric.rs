//! Per-group metric values with an explicit undefined state.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A derived statistic that may not be computable.
///
/// `Undefined` is a value, not an error: it flows through the pipeline as data
/// and never passes a threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Metric {
    /// A computed value.
    Defined(f64),
    /// Could not be computed (empty group, zero mean, all values missing).
    Undefined,
}

impl Metric {
    /// Wrap a raw result, mapping NaN and infinities to `Undefined`.
    pub fn from_f64(value: f64) -> Self {
        if value.is_finite() {
            Metric::Defined(value)
        } else {
            Metric::Undefined
        }
    }

    /// Check if this metric is defined.
    pub fn is_defined(&self) -> bool {
        matches!(self, Metric::Defined(_))
    }

    /// Get the value if defined.
    pub fn value(&self) -> Option<f64> {
        match self {
            Metric::Defined(v) => Some(*v),
            Metric::Undefined => None,
        }
    }

    /// `true` iff defined and `>= bound`.
    pub fn at_least(&self, bound: f64) -> bool {
        matches!(self, Metric::Defined(v) if *v >= bound)
    }

    /// `true` iff defined and `<= bound`.
    pub fn at_most(&self, bound: f64) -> bool {
        matches!(self, Metric::Defined(v) if *v <= bound)
    }

    /// Parse a table cell. Missing markers read back as `Undefined`.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if is_missing_marker(raw) {
            return Some(Metric::Undefined);
        }
        raw.parse::<f64>().ok().map(Metric::from_f64)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::Defined(v) => write!(f, "{}", v),
            Metric::Undefined => write!(f, "{}", MISSING),
        }
    }
}

/// Marker written for missing values and undefined metrics.
pub const MISSING: &str = "NA";

/// Check whether a cell denotes a missing value.
pub fn is_missing_marker(raw: &str) -> bool {
    matches!(raw.trim(), "" | "NA" | "na" | "NaN" | "nan" | "N/A")
}

/// The derived metrics computed for every group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    Frequency,
    Cv,
    Max,
}

impl MetricKind {
    /// All kinds in output column order.
    pub const ALL: [MetricKind; 3] = [MetricKind::Frequency, MetricKind::Cv, MetricKind::Max];

    /// Column prefix used in table files.
    pub fn prefix(&self) -> &'static str {
        match self {
            MetricKind::Frequency => "freq",
            MetricKind::Cv => "cv",
            MetricKind::Max => "max",
        }
    }

    /// Column name for this metric in a group.
    pub fn column_name(&self, group: &str) -> String {
        format!("{}_{}", self.prefix(), group)
    }

    /// Split a column header into metric kind and group label.
    pub fn parse_column(header: &str) -> Option<(MetricKind, &str)> {
        Self::ALL.iter().find_map(|kind| {
            header
                .strip_prefix(kind.prefix())
                .and_then(|rest| rest.strip_prefix('_'))
                .filter(|group| !group.is_empty())
                .map(|group| (*kind, group))
        })
    }
}

/// Metrics of one feature within one group.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricSet {
    /// Fraction of group samples with a detected value.
    pub frequency: Metric,
    /// Coefficient of variation of the present values.
    pub cv: Metric,
    /// Maximum present value.
    pub max_value: Metric,
}

impl MetricSet {
    /// A set with every metric undefined.
    pub fn undefined() -> Self {
        Self {
            frequency: Metric::Undefined,
            cv: Metric::Undefined,
            max_value: Metric::Undefined,
        }
    }

    /// Get a metric by kind.
    pub fn get(&self, kind: MetricKind) -> Metric {
        match kind {
            MetricKind::Frequency => self.frequency,
            MetricKind::Cv => self.cv,
            MetricKind::Max => self.max_value,
        }
    }

    /// Set a metric by kind.
    pub fn set(&mut self, kind: MetricKind, value: Metric) {
        match kind {
            MetricKind::Frequency => self.frequency = value,
            MetricKind::Cv => self.cv = value,
            MetricKind::Max => self.max_value = value,
        }
    }
}

impl Default for MetricSet {
    fn default() -> Self {
        Self::undefined()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_never_passes() {
        assert!(!Metric::Undefined.at_least(0.0));
        assert!(!Metric::Undefined.at_most(f64::INFINITY));
        assert!(Metric::Defined(0.5).at_least(0.5));
        assert!(Metric::Defined(0.5).at_most(0.5));
    }

    #[test]
    fn test_from_f64() {
        assert_eq!(Metric::from_f64(1.5), Metric::Defined(1.5));
        assert_eq!(Metric::from_f64(f64::NAN), Metric::Undefined);
        assert_eq!(Metric::from_f64(f64::INFINITY), Metric::Undefined);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(Metric::parse("0.25"), Some(Metric::Defined(0.25)));
        assert_eq!(Metric::parse("NA"), Some(Metric::Undefined));
        assert_eq!(Metric::parse(""), Some(Metric::Undefined));
        assert_eq!(Metric::parse("abc"), None);
        assert_eq!(Metric::Undefined.to_string(), "NA");
        assert_eq!(Metric::Defined(10.0).to_string(), "10");
    }

    #[test]
    fn test_parse_column() {
        assert_eq!(MetricKind::parse_column("freq_QC"), Some((MetricKind::Frequency, "QC")));
        assert_eq!(MetricKind::parse_column("cv_S"), Some((MetricKind::Cv, "S")));
        assert_eq!(MetricKind::parse_column("max_my_group"), Some((MetricKind::Max, "my_group")));
        assert_eq!(MetricKind::parse_column("freq_"), None);
        assert_eq!(MetricKind::parse_column("sample1"), None);
        assert_eq!(MetricKind::Cv.column_name("D"), "cv_D");
    }
}
