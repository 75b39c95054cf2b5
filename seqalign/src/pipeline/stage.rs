//! Pipeline stages and per-stage failure policy.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Stages of the alignment pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Fetch,
    Inspect,
    Downsample,
    Probe,
    Align,
    Sort,
    Index,
    Publish,
    Cleanup,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 9] = [
        Stage::Fetch,
        Stage::Inspect,
        Stage::Downsample,
        Stage::Probe,
        Stage::Align,
        Stage::Sort,
        Stage::Index,
        Stage::Publish,
        Stage::Cleanup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Inspect => "inspect",
            Stage::Downsample => "downsample",
            Stage::Probe => "probe",
            Stage::Align => "align",
            Stage::Sort => "sort",
            Stage::Index => "index",
            Stage::Publish => "publish",
            Stage::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::config(format!("unknown pipeline stage: {s:?}")))
    }
}

/// What the pipeline does when a stage's command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Log the failure and run the next stage.
    #[default]
    Continue,
    /// Stop the pipeline and mark the job failed.
    Abort,
}

/// Parse a comma-separated stage list such as `"fetch, align"`.
///
/// Empty items are ignored.
pub fn parse_stage_list(list: &str) -> Result<Vec<Stage>, Error> {
    list.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(str::parse)
        .collect()
}
