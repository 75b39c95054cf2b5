//! Retention sweep for published alignments.
//!
//! Published artifacts are recorded in a ledger with their publish time. Each
//! publish step sweeps the ledger first: entries older than the configured
//! age lose their files in the publish directory and leave the ledger. There
//! is no background timer; sweeps only happen as part of a publish.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::utils::filename::is_sorted_artifact_for;
use crate::utils::fs::{list_files, remove_if_exists};

/// Default age after which published artifacts are deleted.
pub const DEFAULT_MAX_AGE_SECS: u64 = 3600;

/// Configuration for the retention sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Age in seconds after which a published artifact is deleted.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE_SECS
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
        }
    }
}

impl RetentionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum artifact age.
    pub fn with_max_age_secs(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.max_age_secs).unwrap_or(i64::MAX))
    }
}

/// Publish times keyed by accession.
#[derive(Debug, Default)]
pub struct PublishLedger {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PublishLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) the publish time of an accession.
    pub fn record(&self, accession: &str, published_at: DateTime<Utc>) {
        self.entries
            .lock()
            .insert(accession.to_string(), published_at);
    }

    pub fn published_at(&self, accession: &str) -> Option<DateTime<Utc>> {
        self.entries.lock().get(accession).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Remove and return every entry other than `exclude` older than `max_age` at `now`.
    fn take_expired(
        &self,
        exclude: &str,
        now: DateTime<Utc>,
        max_age: chrono::Duration,
    ) -> Vec<(String, DateTime<Utc>)> {
        let mut entries = self.entries.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(accession, published_at)| {
                accession.as_str() != exclude && now - **published_at > max_age
            })
            .map(|(accession, _)| accession.clone())
            .collect();

        let mut taken: Vec<(String, DateTime<Utc>)> = expired
            .into_iter()
            .filter_map(|accession| {
                entries
                    .remove(&accession)
                    .map(|published_at| (accession, published_at))
            })
            .collect();
        taken.sort();
        taken
    }
}

/// Result of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Accessions removed from the ledger.
    pub swept: Vec<String>,
    /// Number of files deleted from the publish directory.
    pub files_removed: usize,
    /// Files that could not be deleted, with the error.
    pub failures: Vec<(PathBuf, String)>,
}

/// Deletes published artifacts older than the retention age.
#[derive(Debug)]
pub struct RetentionSweeper {
    publish_dir: PathBuf,
    config: RetentionConfig,
    ledger: PublishLedger,
}

impl RetentionSweeper {
    pub fn new(publish_dir: impl Into<PathBuf>, config: RetentionConfig) -> Self {
        Self {
            publish_dir: publish_dir.into(),
            config,
            ledger: PublishLedger::new(),
        }
    }

    pub fn publish_dir(&self) -> &Path {
        &self.publish_dir
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PublishLedger {
        &self.ledger
    }

    /// Record that `accession` was published now.
    pub fn record(&self, accession: &str) {
        self.record_at(accession, Utc::now());
    }

    pub fn record_at(&self, accession: &str, published_at: DateTime<Utc>) {
        self.ledger.record(accession, published_at);
    }

    /// Sweep expired artifacts, never touching `exclude`.
    pub async fn sweep(&self, exclude: &str) -> SweepReport {
        self.sweep_at(exclude, Utc::now()).await
    }

    /// Sweep as if the current time were `now`.
    ///
    /// A file that cannot be deleted is reported and the sweep moves on; its
    /// ledger entry is dropped either way.
    pub async fn sweep_at(&self, exclude: &str, now: DateTime<Utc>) -> SweepReport {
        let expired = self.ledger.take_expired(exclude, now, self.config.max_age());
        let mut report = SweepReport::default();

        for (accession, published_at) in expired {
            debug!(
                accession = %accession,
                published_at = %published_at,
                "Sweeping expired artifact"
            );

            let listed = list_files(&self.publish_dir, |name| {
                is_sorted_artifact_for(name, &accession)
            })
            .await;
            let files = match listed {
                Ok(files) => files,
                Err(e) => {
                    warn!(accession = %accession, error = %e, "Failed to list published files");
                    report
                        .failures
                        .push((self.publish_dir.clone(), e.to_string()));
                    report.swept.push(accession);
                    continue;
                }
            };

            for path in files {
                match remove_if_exists(&path).await {
                    Ok(true) => report.files_removed += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to delete expired artifact"
                        );
                        report.failures.push((path, e.to_string()));
                    }
                }
            }

            report.swept.push(accession);
        }

        if !report.swept.is_empty() {
            info!(
                count = report.swept.len(),
                files = report.files_removed,
                max_age_secs = self.config.max_age_secs,
                "Swept expired artifacts"
            );
        }

        report
    }
}
