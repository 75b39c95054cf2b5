//! Job registry.
//!
//! Owns every submitted job for the lifetime of the process. Jobs are never
//! removed, so memory grows with the number of submissions.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::handle::{JobHandle, JobStatus};
use crate::Result;
use crate::pipeline::PipelineExecutor;
use crate::utils::filename::validate_accession;

/// Payload returned for ids that do not name a job.
pub const INVALID_TASK_ID: &str = "Invalid task ID";

/// Status reported to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    Processing,
    Complete,
    Failed,
}

impl From<JobStatus> for PollStatus {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Running => PollStatus::Processing,
            JobStatus::Complete => PollStatus::Complete,
            JobStatus::Failed => PollStatus::Failed,
        }
    }
}

/// Answer to a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PollResponse {
    /// The id is malformed or unknown.
    Invalid { error: String },
    /// The job exists. `lines` is only present while it is processing.
    Status {
        status: PollStatus,
        log: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lines: Option<u64>,
    },
}

impl PollResponse {
    pub fn invalid() -> Self {
        PollResponse::Invalid {
            error: INVALID_TASK_ID.to_string(),
        }
    }

    pub fn status(&self) -> Option<PollStatus> {
        match self {
            PollResponse::Invalid { .. } => None,
            PollResponse::Status { status, .. } => Some(*status),
        }
    }
}

/// Registry of submitted jobs.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: DashMap<Uuid, Arc<JobHandle>>,
    executor: Arc<PipelineExecutor>,
}

impl JobRegistry {
    pub fn new(executor: Arc<PipelineExecutor>) -> Self {
        Self {
            jobs: DashMap::new(),
            executor,
        }
    }

    pub fn executor(&self) -> &Arc<PipelineExecutor> {
        &self.executor
    }

    /// Register a job for `accession` and start its pipeline in the background.
    ///
    /// Returns as soon as the job is registered. Must be called from within a
    /// tokio runtime.
    pub fn submit(&self, accession: &str) -> Result<Uuid> {
        validate_accession(accession)?;

        let handle = loop {
            let id = Uuid::new_v4();
            if let Entry::Vacant(entry) = self.jobs.entry(id) {
                let handle = Arc::new(JobHandle::new(id, accession));
                entry.insert(handle.clone());
                break handle;
            }
        };

        let executor = self.executor.clone();
        let task = tokio::spawn({
            let handle = handle.clone();
            async move { executor.run(handle).await }
        });
        handle.attach_task(task);

        info!(job_id = %handle.id(), accession = %accession, "Job submitted");
        Ok(handle.id())
    }

    pub fn lookup(&self, id: &Uuid) -> Option<Arc<JobHandle>> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Report the state of the job named by `task_id`.
    ///
    /// Unknown or malformed ids get [`PollResponse::Invalid`]; this never fails.
    pub async fn poll(&self, task_id: &str) -> PollResponse {
        let Some(job) = Uuid::parse_str(task_id)
            .ok()
            .and_then(|id| self.lookup(&id))
        else {
            return PollResponse::invalid();
        };

        job.reconcile();
        let status = job.status();
        let lines = match status {
            JobStatus::Running => Some(self.executor.progress().read(&job.id()).await),
            JobStatus::Complete | JobStatus::Failed => None,
        };

        PollResponse::Status {
            status: status.into(),
            log: job.log_lines(),
            lines,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;
    use crate::retention::{RetentionConfig, RetentionSweeper};
    use crate::runner::{CommandOutcome, CommandRunner, CommandSpec};
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Fails every command, so jobs end quickly after the read count.
    struct FailingRunner;

    #[async_trait]
    impl CommandRunner for FailingRunner {
        async fn run(&self, _spec: &CommandSpec) -> Result<CommandOutcome> {
            Ok(CommandOutcome::failure(127))
        }
    }

    fn registry(work: &TempDir) -> JobRegistry {
        let sweeper = Arc::new(RetentionSweeper::new(
            work.path().join("public"),
            RetentionConfig::default(),
        ));
        let executor = Arc::new(PipelineExecutor::new(
            PipelineConfig::new(work.path()),
            Arc::new(FailingRunner),
            sweeper,
        ));
        JobRegistry::new(executor)
    }

    async fn wait_terminal(registry: &JobRegistry, id: Uuid) -> PollResponse {
        loop {
            let response = registry.poll(&id.to_string()).await;
            if response.status() != Some(PollStatus::Processing) {
                return response;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn test_submit_rejects_invalid_accession() {
        let work = TempDir::new().unwrap();
        let registry = registry(&work);
        assert!(registry.submit("../etc/passwd").is_err());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_submit_returns_distinct_ids() {
        let work = TempDir::new().unwrap();
        let registry = registry(&work);
        let a = registry.submit("SRR000").unwrap();
        let b = registry.submit("SRR000").unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(&a).unwrap().accession(), "SRR000");
    }

    #[tokio::test]
    async fn test_poll_unknown_and_malformed_ids() {
        let work = TempDir::new().unwrap();
        let registry = registry(&work);
        assert_eq!(registry.poll("not-a-uuid").await, PollResponse::invalid());
        assert_eq!(
            registry.poll(&Uuid::new_v4().to_string()).await,
            PollResponse::invalid()
        );
    }

    #[tokio::test]
    async fn test_failed_job_polls_identically() {
        let work = TempDir::new().unwrap();
        let registry = registry(&work);
        let id = registry.submit("SRR000").unwrap();

        let first = wait_terminal(&registry, id).await;
        let second = registry.poll(&id.to_string()).await;

        assert_eq!(first.status(), Some(PollStatus::Failed));
        assert_eq!(first, second);
    }

    #[test]
    fn test_poll_response_json_shapes() {
        let invalid = serde_json::to_value(PollResponse::invalid()).unwrap();
        assert_eq!(invalid, serde_json::json!({"error": "Invalid task ID"}));

        let processing = serde_json::to_value(PollResponse::Status {
            status: PollStatus::Processing,
            log: vec!["line".to_string()],
            lines: Some(12),
        })
        .unwrap();
        assert_eq!(
            processing,
            serde_json::json!({"status": "processing", "log": ["line"], "lines": 12})
        );

        let complete = serde_json::to_value(PollResponse::Status {
            status: PollStatus::Complete,
            log: Vec::new(),
            lines: None,
        })
        .unwrap();
        assert_eq!(complete, serde_json::json!({"status": "complete", "log": []}));
    }
}
