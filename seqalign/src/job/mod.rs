//! Job tracking.

pub mod handle;
pub mod registry;

pub use handle::{JobHandle, JobLogEntry, JobStatus, LogLevel};
pub use registry::{INVALID_TASK_ID, JobRegistry, PollResponse, PollStatus};
