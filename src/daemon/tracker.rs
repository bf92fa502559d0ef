use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::daemon::downloader::{extract_title, parse_progress};
use crate::models::{JobSnapshot, JobStatus};

/// Number of output lines a job keeps.
pub const LOG_CAPACITY: usize = 50;

/// Lines included in each streamed progress snapshot.
pub const STREAM_TAIL: usize = 3;

#[derive(Debug)]
struct JobState {
    status: JobStatus,
    progress: f64,
    log: VecDeque<String>,
    title: String,
}

/// One ad-hoc download. Written by its worker, read by any number of
/// progress requests.
#[derive(Debug)]
pub struct Job {
    id: Uuid,
    state: RwLock<JobState>,
}

impl Job {
    fn new(id: Uuid) -> Self {
        Self {
            id,
            state: RwLock::new(JobState {
                status: JobStatus::Running,
                progress: 0.0,
                log: VecDeque::with_capacity(LOG_CAPACITY),
                title: String::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub async fn status(&self) -> JobStatus {
        self.state.read().await.status
    }

    /// Record one line of downloader output: append it to the bounded log,
    /// pick up a progress percentage, and capture the title if still unknown.
    pub async fn record_line(&self, line: &str) {
        let mut state = self.state.write().await;
        push_bounded(&mut state.log, line.to_string());

        if let Some(pct) = parse_progress(line) {
            state.progress = pct;
        }
        if state.title.is_empty() {
            if let Some(title) = extract_title(line) {
                state.title = title;
            }
        }
    }

    /// Mark the job successfully finished.
    pub async fn finish_success(&self) {
        let mut state = self.state.write().await;
        if state.status.is_terminal() {
            return;
        }
        state.status = JobStatus::Done;
        state.progress = 100.0;
    }

    /// Mark the job failed, appending `ERROR: <reason>` to the log first.
    pub async fn fail(&self, reason: Option<String>) {
        let mut state = self.state.write().await;
        if state.status.is_terminal() {
            return;
        }
        if let Some(reason) = reason {
            push_bounded(&mut state.log, format!("ERROR: {}", reason));
        }
        state.status = JobStatus::Error;
    }

    /// Consistent copy of the job. `tail` limits the log to its last lines.
    pub async fn snapshot(&self, tail: Option<usize>) -> JobSnapshot {
        let state = self.state.read().await;
        let skip = tail
            .map(|n| state.log.len().saturating_sub(n))
            .unwrap_or(0);
        JobSnapshot {
            status: state.status,
            progress: state.progress,
            log: state.log.iter().skip(skip).cloned().collect(),
            title: state.title.clone(),
        }
    }
}

fn push_bounded(log: &mut VecDeque<String>, line: String) {
    if log.len() == LOG_CAPACITY {
        log.pop_front();
    }
    log.push_back(line);
}

/// In-memory registry of ad-hoc jobs. Entries are never evicted.
#[derive(Debug, Default)]
pub struct JobTracker {
    jobs: RwLock<HashMap<Uuid, Arc<Job>>>,
}

impl JobTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh running job.
    pub async fn create(&self) -> Arc<Job> {
        let job = Arc::new(Job::new(Uuid::now_v7()));
        self.jobs.write().await.insert(job.id, Arc::clone(&job));
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Job>> {
        self.jobs.read().await.get(&id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_starts_running_and_empty() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;

        let snap = job.snapshot(None).await;
        assert_eq!(snap.status, JobStatus::Running);
        assert_eq!(snap.progress, 0.0);
        assert!(snap.log.is_empty());
        assert!(snap.title.is_empty());
        assert_eq!(tracker.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_known_and_unknown() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;

        let found = tracker.get(job.id()).await.expect("registered");
        assert!(Arc::ptr_eq(&found, &job));
        assert!(tracker.get(Uuid::now_v7()).await.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let tracker = JobTracker::new();
        let a = tracker.create().await;
        let b = tracker.create().await;
        assert_ne!(a.id(), b.id());
        assert_eq!(tracker.len().await, 2);
    }

    #[tokio::test]
    async fn test_log_is_bounded_to_capacity() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;
        for i in 0..(LOG_CAPACITY + 10) {
            job.record_line(&format!("line {}", i)).await;
        }

        let snap = job.snapshot(None).await;
        assert_eq!(snap.log.len(), LOG_CAPACITY);
        assert_eq!(snap.log[0], "line 10");
        assert_eq!(snap.log[LOG_CAPACITY - 1], format!("line {}", LOG_CAPACITY + 9));
    }

    #[tokio::test]
    async fn test_snapshot_tail() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;
        for line in ["a", "b", "c", "d"] {
            job.record_line(line).await;
        }

        assert_eq!(job.snapshot(Some(STREAM_TAIL)).await.log, vec!["b", "c", "d"]);
        assert_eq!(job.snapshot(Some(10)).await.log.len(), 4);
    }

    #[tokio::test]
    async fn test_record_line_updates_progress_and_title_once() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;

        job.record_line("[info] abc123: First Title").await;
        job.record_line("[download]  42.3% of 100MiB").await;
        job.record_line("[info] def456: Second Title").await;

        let snap = job.snapshot(None).await;
        assert_eq!(snap.progress, 42.3);
        assert_eq!(snap.title, "First Title");
    }

    #[tokio::test]
    async fn test_finish_success_sets_full_progress() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;
        job.record_line("[download]  10.0% of 1MiB").await;
        job.finish_success().await;

        let snap = job.snapshot(None).await;
        assert_eq!(snap.status, JobStatus::Done);
        assert_eq!(snap.progress, 100.0);
    }

    #[tokio::test]
    async fn test_fail_appends_error_line() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;
        job.record_line("something").await;
        job.fail(Some("No such file or directory".to_string())).await;

        let snap = job.snapshot(None).await;
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(
            snap.log.last().map(String::as_str),
            Some("ERROR: No such file or directory")
        );
    }

    #[tokio::test]
    async fn test_terminal_status_is_final() {
        let tracker = JobTracker::new();
        let job = tracker.create().await;
        job.fail(None).await;
        job.finish_success().await;

        let snap = job.snapshot(None).await;
        assert_eq!(snap.status, JobStatus::Error);
        assert_eq!(snap.progress, 0.0);
        assert!(snap.log.is_empty());
    }
}
