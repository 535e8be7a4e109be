//! Threshold filtering of feature tables on group metrics.

pub mod threshold;

pub use threshold::{
    filter_by_threshold, filter_by_threshold_with_stats, FilterResult, FilterSpec, DEFAULT_MAX_CV,
};
