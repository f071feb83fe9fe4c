use crate::types::{JobSnapshot, JobStatus};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::process::Child;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::debug;
use uuid::Uuid;

struct JobState {
    status: JobStatus,
    output: String,
    exit_code: Option<i32>,
}

/// One supervised execution of an external process.
///
/// The state word (status, output, exit code) lives under a single lock so
/// polling readers never observe a torn update. The process handle is owned
/// exclusively until termination: whichever side takes it (the worker at
/// natural exit, or a canceller) is the side that finalizes the job.
pub struct Job {
    pub id: Uuid,
    state: Mutex<JobState>,
    process: AsyncMutex<Option<Child>>,
}

impl Job {
    pub(crate) fn new(id: Uuid) -> Self {
        Self {
            id,
            state: Mutex::new(JobState {
                status: JobStatus::Running,
                output: String::new(),
                exit_code: None,
            }),
            process: AsyncMutex::new(None),
        }
    }

    pub fn append(&self, text: &str) {
        let mut state = self.state.lock().expect("job state lock poisoned");
        state.output.push_str(text);
    }

    pub fn status(&self) -> JobStatus {
        self.state.lock().expect("job state lock poisoned").status
    }

    pub fn is_running(&self) -> bool {
        self.status() == JobStatus::Running
    }

    /// One-shot terminal transition. Sets the exit code and the status in the
    /// same critical section; a no-op returning `false` once the job has
    /// already left `running`.
    pub fn finish(&self, exit_code: i32, status: Option<JobStatus>) -> bool {
        let mut state = self.state.lock().expect("job state lock poisoned");
        if state.status != JobStatus::Running {
            return false;
        }
        state.exit_code = Some(exit_code);
        state.status = status.unwrap_or(if exit_code == 0 {
            JobStatus::Finished
        } else {
            JobStatus::Error
        });
        true
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let state = self.state.lock().expect("job state lock poisoned");
        JobSnapshot {
            id: self.id,
            status: state.status,
            output: state.output.clone(),
            exit_code: state.exit_code,
        }
    }

    pub(crate) async fn attach_process(&self, child: Child) {
        *self.process.lock().await = Some(child);
    }

    pub(crate) async fn take_process(&self) -> Option<Child> {
        self.process.lock().await.take()
    }
}

/// Process-wide table of jobs plus the "current job" pointer.
///
/// Starting a job replaces the pointer unconditionally; a previous
/// still-running job stays in the table and remains discoverable through the
/// scan fallback in [`current_snapshot`](JobRegistry::current_snapshot).
pub struct JobRegistry {
    jobs: RwLock<HashMap<Uuid, Arc<Job>>>,
    current: AsyncMutex<Option<Uuid>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            current: AsyncMutex::new(None),
        }
    }

    /// Create and register a job, making it the current one.
    pub async fn create(&self) -> Arc<Job> {
        let id = Uuid::new_v4();
        let job = Arc::new(Job::new(id));
        self.jobs.write().await.insert(id, job.clone());
        *self.current.lock().await = Some(id);
        debug!("Registered job {}", id);
        job
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Job>> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// Snapshot of one job; `None` for unknown ids.
    pub async fn snapshot(&self, id: Uuid) -> Option<JobSnapshot> {
        Some(self.get(id).await?.snapshot())
    }

    pub async fn current_id(&self) -> Option<Uuid> {
        *self.current.lock().await
    }

    /// The current job if the pointer is set; otherwise any job still running
    /// (covers the window where the pointer was cleared by a race while a
    /// worker is still draining); `None` when idle.
    pub async fn current_snapshot(&self) -> Option<JobSnapshot> {
        if let Some(id) = self.current_id().await {
            if let Some(snapshot) = self.snapshot(id).await {
                return Some(snapshot);
            }
        }
        self.jobs
            .read()
            .await
            .values()
            .find(|job| job.is_running())
            .map(|job| job.snapshot())
    }

    /// Clear the current pointer, but only if it still points at `id`.
    pub async fn clear_current_if(&self, id: Uuid) {
        let mut current = self.current.lock().await;
        if *current == Some(id) {
            *current = None;
        }
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}
