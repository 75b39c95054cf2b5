//! Alignment pipeline.
//!
//! One job runs the stages in [`Stage::ALL`] order inside a shared work
//! directory. Jobs are kept apart only by accession-prefixed file names.

pub mod commands;
pub mod executor;
pub mod layout;
pub mod stage;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use commands::{CommandBuilder, ToolConfig};
pub use executor::PipelineExecutor;
pub use layout::ReadLayout;
pub use stage::{FailurePolicy, Stage, parse_stage_list};

use crate::downsample::DownsampleConfig;

/// Configuration for the pipeline executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory where downloads and intermediate files live.
    pub work_dir: PathBuf,
    #[serde(default)]
    pub tools: ToolConfig,
    #[serde(default)]
    pub downsample: DownsampleConfig,
    /// Stages whose failure stops the job. Every other stage continues.
    #[serde(default)]
    pub abort_on: Vec<Stage>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

impl PipelineConfig {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
            tools: ToolConfig::default(),
            downsample: DownsampleConfig::default(),
            abort_on: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: ToolConfig) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_downsample(mut self, downsample: DownsampleConfig) -> Self {
        self.downsample = downsample;
        self
    }

    /// Make failures of `stages` fatal.
    pub fn with_abort_on(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.abort_on = stages.into_iter().collect();
        self
    }

    pub fn policy_for(&self, stage: Stage) -> FailurePolicy {
        if self.abort_on.contains(&stage) {
            FailurePolicy::Abort
        } else {
            FailurePolicy::Continue
        }
    }
}
