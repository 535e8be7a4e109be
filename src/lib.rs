//! bolflow - Metabolomic Workflow Library
//!
//! This library provides the stages of a metabolomic feature-table workflow:
//! merging measurement tables, per-group descriptive statistics, duplicate
//! feature removal and threshold filtering.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (FeatureTable, Classification, Metric)
//! - **join**: Outer join of measurement tables on the feature key
//! - **stats**: Frequency, coefficient of variation and maximum per group
//! - **dedup**: Duplicate removal within per-group ordinal windows
//! - **filter**: Frequency and CV threshold filtering
//! - **pipeline**: Pipeline composition and execution
//!
//! # Example
//!
//! ```no_run
//! use bolflow::prelude::*;
//!
//! // Load data
//! let classification = Classification::from_path("classification.csv").unwrap();
//! let tables = vec![
//!     FeatureTable::from_path("batch1.csv", &classification).unwrap(),
//!     FeatureTable::from_path("batch2.csv", &classification).unwrap(),
//! ];
//!
//! // Run the workflow
//! let result = Pipeline::new()
//!     .compute_metrics(Dispersion::Sample)
//!     .remove_duplicates(WindowSpec::from_json(r#"{"A":[0,5], "B":[4,10]}"#).unwrap())
//!     .filter_threshold(FilterSpec::new("QC", 50.0))
//!     .run_tables(&tables, &classification)
//!     .unwrap();
//!
//! result.to_path("filtered.csv").unwrap();
//! ```

pub mod data;
pub mod dedup;
pub mod error;
pub mod filter;
pub mod join;
pub mod pipeline;
pub mod stats;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::data::{
        Classification, FeatureTable, GroupMembership, Membership, Metric, MetricKind, MetricSet,
        SampleColumn,
    };
    pub use crate::dedup::{
        remove_duplicates, remove_duplicates_with, remove_duplicates_with_stats, AmbiguityPolicy,
        DedupResult, Window, WindowSpec,
    };
    pub use crate::error::{BolflowError, Result};
    pub use crate::filter::{
        filter_by_threshold, filter_by_threshold_with_stats, FilterResult, FilterSpec,
    };
    pub use crate::join::join_tables;
    pub use crate::pipeline::{run_workflow, Pipeline, PipelineConfig, PipelineStep};
    pub use crate::stats::{compute_group_metrics, compute_group_metrics_with, Dispersion, StatsConfig};
}
