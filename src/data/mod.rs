//! Data structures for the metabolomic workflow.

mod classification;
mod metric;
mod table;

pub use classification::{Classification, GroupMembership, Membership, IGNORED_COLUMNS};
pub use metric::{is_missing_marker, Metric, MetricKind, MetricSet, MISSING};
pub use table::{delimiter_for, is_detected, FeatureTable, SampleColumn, DEFAULT_KEY_HEADER};
