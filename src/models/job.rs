use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Done,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Running)
    }
}

/// Point-in-time view of a download job, as streamed to the browser.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobSnapshot {
    pub status: JobStatus,
    pub progress: f64,
    pub log: Vec<String>,
    pub title: String,
}

impl JobSnapshot {
    /// Snapshot sent for a job id the tracker does not know.
    pub fn unknown() -> Self {
        Self {
            status: JobStatus::Error,
            progress: 0.0,
            log: Vec::new(),
            title: String::new(),
        }
    }
}
