//! Per-group descriptive statistics for feature tables.

pub mod group;

pub use group::{
    compute_group_metrics, compute_group_metrics_with, compute_metric_set, Dispersion,
    StatsConfig,
};
