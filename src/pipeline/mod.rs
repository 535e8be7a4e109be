//! Pipeline composition and execution for the metabolomic workflow.

mod runner;

pub use runner::{run_workflow, Pipeline, PipelineConfig, PipelineStep};
