//! Read downsampling decision.
//!
//! Inputs above the read ceiling are subsampled with an external sampler
//! (`seqtk sample`). The sampler is seeded, so repeated runs against the same
//! input produce the same subset. For paired layouts both mate files are
//! sampled with the same fraction and the same seed; mates stay paired only
//! because `seqtk sample -s<seed>` draws the same sequence of random numbers
//! for both files.

use serde::{Deserialize, Serialize};

/// Default read ceiling above which inputs are downsampled.
pub const DEFAULT_MAX_READS: u64 = 100_000;

/// Default sampler seed.
pub const DEFAULT_SEED: u64 = 100;

/// Downsampling configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownsampleConfig {
    /// Maximum number of reads kept per input file.
    #[serde(default = "default_max_reads")]
    pub max_reads: u64,
    /// Seed passed to the sampler.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_max_reads() -> u64 {
    DEFAULT_MAX_READS
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        Self {
            max_reads: default_max_reads(),
            seed: default_seed(),
        }
    }
}

impl DownsampleConfig {
    /// Decide for an observed read count using this configuration's ceiling.
    pub fn decide(&self, observed_reads: u64) -> DownsampleDecision {
        decide(observed_reads, self.max_reads)
    }
}

/// Outcome of [`decide`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownsampleDecision {
    /// Keep the input untouched.
    Keep,
    /// Sample each read with the given probability, in `(0, 1)`.
    Sample { fraction: f64 },
}

impl DownsampleDecision {
    pub fn fraction(&self) -> Option<f64> {
        match self {
            Self::Keep => None,
            Self::Sample { fraction } => Some(*fraction),
        }
    }
}

/// Decide whether `observed_reads` must be reduced to `ceiling`.
///
/// Zero reads (an empty or missing input) never samples, and neither does a
/// zero ceiling, which has no fraction in `(0, 1)`.
pub fn decide(observed_reads: u64, ceiling: u64) -> DownsampleDecision {
    if ceiling == 0 || observed_reads == 0 || observed_reads <= ceiling {
        return DownsampleDecision::Keep;
    }

    DownsampleDecision::Sample {
        fraction: ceiling as f64 / observed_reads as f64,
    }
}
