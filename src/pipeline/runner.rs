//! Pipeline runner for composing and executing workflow stages.

use crate::data::{FeatureTable, GroupMembership};
use crate::dedup::{remove_duplicates_with, AmbiguityPolicy, WindowSpec};
use crate::error::{BolflowError, Result};
use crate::filter::threshold::default_max_cv;
use crate::filter::{filter_by_threshold, FilterSpec};
use crate::join::join_tables;
use crate::stats::{compute_group_metrics_with, Dispersion, StatsConfig};
use log::info;
use serde::{Deserialize, Serialize};

/// A step in the workflow pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineStep {
    /// Compute frequency, CV and max for every group.
    ComputeMetrics {
        #[serde(default)]
        dispersion: Dispersion,
    },
    /// Collapse duplicate features inside per-group windows.
    RemoveDuplicates {
        windows: WindowSpec,
        #[serde(default)]
        policy: AmbiguityPolicy,
    },
    /// Keep features passing a frequency (and optional CV) threshold.
    FilterThreshold {
        group_type: String,
        threshold_percent: f64,
        #[serde(default)]
        use_cv: bool,
        #[serde(default = "default_max_cv")]
        max_cv: f64,
    },
}

/// Pipeline configuration for serialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the pipeline.
    pub name: String,
    /// Description.
    pub description: Option<String>,
    /// Steps to execute.
    pub steps: Vec<PipelineStep>,
}

impl PipelineConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(BolflowError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(BolflowError::from)
    }
}

/// Builder for constructing and running workflow pipelines.
#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<PipelineStep>,
    name: String,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Pipeline {
    /// Create a new empty pipeline.
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            name: "unnamed".to_string(),
        }
    }

    /// Create from a config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            steps: config.steps.clone(),
            name: config.name.clone(),
        }
    }

    /// Set the pipeline name.
    pub fn name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add group statistics.
    pub fn compute_metrics(mut self, dispersion: Dispersion) -> Self {
        self.steps.push(PipelineStep::ComputeMetrics { dispersion });
        self
    }

    /// Add duplicate removal with the default ambiguity policy.
    pub fn remove_duplicates(self, windows: WindowSpec) -> Self {
        self.remove_duplicates_with(windows, AmbiguityPolicy::default())
    }

    /// Add duplicate removal with an explicit ambiguity policy.
    pub fn remove_duplicates_with(mut self, windows: WindowSpec, policy: AmbiguityPolicy) -> Self {
        self.steps
            .push(PipelineStep::RemoveDuplicates { windows, policy });
        self
    }

    /// Add threshold filtering.
    pub fn filter_threshold(mut self, spec: FilterSpec) -> Self {
        self.steps.push(PipelineStep::FilterThreshold {
            group_type: spec.group_type,
            threshold_percent: spec.threshold_percent,
            use_cv: spec.use_cv,
            max_cv: spec.max_cv,
        });
        self
    }

    /// Get the steps.
    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    /// Convert to config for serialization.
    pub fn to_config(&self, description: Option<&str>) -> PipelineConfig {
        PipelineConfig {
            name: self.name.clone(),
            description: description.map(String::from),
            steps: self.steps.clone(),
        }
    }

    /// Run the pipeline on a table.
    pub fn run<M: GroupMembership + ?Sized>(
        &self,
        table: &FeatureTable,
        membership: &M,
    ) -> Result<FeatureTable> {
        info!(
            "Running pipeline '{}' ({} steps) on {} features",
            self.name,
            self.steps.len(),
            table.n_features()
        );
        let mut current = table.clone();

        for (i, step) in self.steps.iter().enumerate() {
            current = apply(current, step, membership).map_err(|e| BolflowError::Step {
                index: i + 1,
                step: format!("{:?}", step),
                source: Box::new(e),
            })?;
        }

        Ok(current)
    }

    /// Join the input tables, then run the pipeline on the result.
    pub fn run_tables<M: GroupMembership + ?Sized>(
        &self,
        tables: &[FeatureTable],
        membership: &M,
    ) -> Result<FeatureTable> {
        let joined = join_tables(tables, membership)?;
        self.run(&joined, membership)
    }
}

fn apply<M: GroupMembership + ?Sized>(
    table: FeatureTable,
    step: &PipelineStep,
    membership: &M,
) -> Result<FeatureTable> {
    match step {
        PipelineStep::ComputeMetrics { dispersion } => compute_group_metrics_with(
            &table,
            membership,
            &StatsConfig {
                dispersion: *dispersion,
            },
        ),
        PipelineStep::RemoveDuplicates { windows, policy } => {
            remove_duplicates_with(&table, membership, windows, *policy)
        }
        PipelineStep::FilterThreshold {
            group_type,
            threshold_percent,
            use_cv,
            max_cv,
        } => {
            let spec = FilterSpec {
                group_type: group_type.clone(),
                threshold_percent: *threshold_percent,
                use_cv: *use_cv,
                max_cv: *max_cv,
            };
            filter_by_threshold(&table, membership, &spec)
        }
    }
}

/// Convenience function to run the full workflow: join, statistics,
/// duplicate removal and threshold filtering.
pub fn run_workflow<M: GroupMembership + ?Sized>(
    tables: &[FeatureTable],
    membership: &M,
    windows: &WindowSpec,
    filter: &FilterSpec,
) -> Result<FeatureTable> {
    Pipeline::new()
        .name("bolflow")
        .compute_metrics(Dispersion::default())
        .remove_duplicates(windows.clone())
        .filter_threshold(filter.clone())
        .run_tables(tables, membership)
}
