//! Job handle: status, log buffer and the task running the pipeline.

use chrono::{DateTime, Local, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Pipeline is still executing.
    Running,
    /// Pipeline reached its last stage.
    Complete,
    /// Pipeline stopped on a fatal error.
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Running => write!(f, "running"),
            JobStatus::Complete => write!(f, "complete"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Log level for job execution logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// A single log entry for job execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobLogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl JobLogEntry {
    /// Create a new log entry with the current timestamp.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    /// Human-readable line, `2024-01-01 12:00:00 [INFO] message`, in local time.
    pub fn render(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S"),
            self.level,
            self.message
        )
    }
}

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    logs: Vec<JobLogEntry>,
    finished_at: Option<DateTime<Utc>>,
}

/// A submitted job.
///
/// The registry owns the handle; the pipeline only appends log lines and
/// reports the terminal status through it. Once the status leaves
/// [`JobStatus::Running`] the log is frozen.
#[derive(Debug)]
pub struct JobHandle {
    id: Uuid,
    accession: String,
    created_at: DateTime<Utc>,
    state: RwLock<JobState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl JobHandle {
    pub fn new(id: Uuid, accession: impl Into<String>) -> Self {
        Self {
            id,
            accession: accession.into(),
            created_at: Utc::now(),
            state: RwLock::new(JobState {
                status: JobStatus::Running,
                logs: Vec::new(),
                finished_at: None,
            }),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn accession(&self) -> &str {
        &self.accession
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn status(&self) -> JobStatus {
        self.state.read().status
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.state.read().finished_at
    }

    /// Append a log line. Returns `false` (and drops the line) once the job
    /// has reached a terminal status.
    pub fn log(&self, level: LogLevel, message: impl Into<String>) -> bool {
        let entry = JobLogEntry::new(level, message);
        let mut state = self.state.write();
        if state.status.is_terminal() {
            debug!(
                job_id = %self.id,
                message = %entry.message,
                "Dropping log line for finished job"
            );
            return false;
        }

        match level {
            LogLevel::Debug => {
                debug!(job_id = %self.id, accession = %self.accession, "{}", entry.message)
            }
            LogLevel::Info => {
                info!(job_id = %self.id, accession = %self.accession, "{}", entry.message)
            }
            LogLevel::Warn => {
                warn!(job_id = %self.id, accession = %self.accession, "{}", entry.message)
            }
            LogLevel::Error => {
                error!(job_id = %self.id, accession = %self.accession, "{}", entry.message)
            }
        }

        state.logs.push(entry);
        true
    }

    pub fn info(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Info, message)
    }

    pub fn warn(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Warn, message)
    }

    pub fn error(&self, message: impl Into<String>) -> bool {
        self.log(LogLevel::Error, message)
    }

    /// Move the job to a terminal status. Only the first call has an effect.
    pub fn finish(&self, status: JobStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }

        let mut state = self.state.write();
        if state.status.is_terminal() {
            return false;
        }
        state.status = status;
        state.finished_at = Some(Utc::now());
        info!(job_id = %self.id, accession = %self.accession, status = %status, "Job finished");
        true
    }

    /// Copy of the log entries in insertion order.
    pub fn logs(&self) -> Vec<JobLogEntry> {
        self.state.read().logs.clone()
    }

    /// Rendered log lines in insertion order.
    pub fn log_lines(&self) -> Vec<String> {
        self.state
            .read()
            .logs
            .iter()
            .map(JobLogEntry::render)
            .collect()
    }

    /// Store the task running this job's pipeline.
    pub fn attach_task(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    /// Whether the attached task has stopped running.
    pub fn task_finished(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|task| task.is_finished())
    }

    /// Mark the job failed when its task stopped without reporting a status,
    /// which only happens if the pipeline panicked.
    pub fn reconcile(&self) {
        if self.status() == JobStatus::Running && self.task_finished() {
            self.error("Pipeline task stopped unexpectedly");
            self.finish(JobStatus::Failed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_running_and_empty() {
        let job = JobHandle::new(Uuid::new_v4(), "SRR000");
        assert_eq!(job.status(), JobStatus::Running);
        assert_eq!(job.accession(), "SRR000");
        assert!(job.logs().is_empty());
        assert!(job.finished_at().is_none());
    }

    #[test]
    fn test_logs_keep_insertion_order() {
        let job = JobHandle::new(Uuid::new_v4(), "SRR000");
        job.info("first");
        job.warn("second");
        job.error("third");

        let messages: Vec<_> = job.logs().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, ["first", "second", "third"]);

        let lines = job.log_lines();
        assert!(lines[0].ends_with("[INFO] first"));
        assert!(lines[1].ends_with("[WARN] second"));
        assert!(lines[2].ends_with("[ERROR] third"));
    }

    #[test]
    fn test_status_transitions_once() {
        let job = JobHandle::new(Uuid::new_v4(), "SRR000");
        assert!(!job.finish(JobStatus::Running));
        assert!(job.finish(JobStatus::Complete));
        assert!(!job.finish(JobStatus::Failed));
        assert_eq!(job.status(), JobStatus::Complete);
        assert!(job.finished_at().is_some());
    }

    #[test]
    fn test_no_logs_after_terminal_status() {
        let job = JobHandle::new(Uuid::new_v4(), "SRR000");
        assert!(job.info("before"));
        job.finish(JobStatus::Failed);
        assert!(!job.info("after"));
        assert_eq!(job.logs().len(), 1);
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Complete).unwrap(),
            "\"complete\""
        );
        assert_eq!(JobStatus::Failed.to_string(), "failed");
    }

    #[tokio::test]
    async fn test_reconcile_marks_panicked_task_failed() {
        let job = JobHandle::new(Uuid::new_v4(), "SRR000");
        let task: JoinHandle<()> = tokio::spawn(async { panic!("boom") });
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        job.attach_task(task);

        job.reconcile();
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.logs()[0].message.contains("stopped unexpectedly"));
    }

    #[tokio::test]
    async fn test_reconcile_ignores_running_task() {
        let job = JobHandle::new(Uuid::new_v4(), "SRR000");
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        job.attach_task(tokio::spawn(async move {
            let _ = rx.await;
        }));

        job.reconcile();
        assert_eq!(job.status(), JobStatus::Running);
        let _ = tx.send(());
    }
}
