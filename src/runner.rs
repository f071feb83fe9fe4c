use crate::jobs::{Job, JobRegistry};
use crate::types::{JobSnapshot, JobStatus};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

const CANCEL_GRACE: Duration = Duration::from_secs(5);
const CANCEL_EXIT_CODE: i32 = -9;

/// Spawns external processes as background jobs and supervises them.
///
/// Each started job gets its own worker task that streams the process's
/// combined output into the job buffer and finalizes the status on exit.
/// Callers never block on job completion; they poll snapshots instead.
pub struct JobRunner {
    registry: Arc<JobRegistry>,
}

impl JobRunner {
    pub fn new(registry: Arc<JobRegistry>) -> Self {
        Self { registry }
    }

    /// Start `command` asynchronously and return the job id immediately.
    ///
    /// Spawn failures do not surface here: the job is still created and
    /// transitions to `error` with the failure captured in its output.
    pub async fn start(&self, command: Vec<String>, cwd: Option<PathBuf>) -> Uuid {
        let job = self.registry.create().await;
        let id = job.id;
        info!("Starting job {}: {:?}", id, command);

        let registry = self.registry.clone();
        tokio::spawn(async move {
            run_stream(registry, job, command, cwd).await;
        });

        id
    }

    pub async fn status(&self, id: Uuid) -> Option<JobSnapshot> {
        self.registry.snapshot(id).await
    }

    pub async fn current(&self) -> Option<JobSnapshot> {
        self.registry.current_snapshot().await
    }

    /// Cancel `id`, or the current job when no id is given.
    ///
    /// Termination escalates in two phases: a graceful signal with a bounded
    /// wait, then a hard kill with another bounded wait. The job is marked
    /// `canceled` with exit code -9. Cancelling a job that is missing, already
    /// terminal, or has no live process handle fails with "No running job",
    /// which also makes a double-cancel fail cleanly.
    pub async fn cancel(&self, id: Option<Uuid>) -> (bool, String) {
        let target = match id {
            Some(id) => Some(id),
            None => self.registry.current_id().await,
        };
        let Some(target) = target else {
            return (false, "No running job".to_string());
        };
        let Some(job) = self.registry.get(target).await else {
            return (false, "No running job".to_string());
        };
        if !job.is_running() {
            return (false, "No running job".to_string());
        }
        let Some(mut child) = job.take_process().await else {
            return (false, "No running job".to_string());
        };

        job.append("\n[INFO] Cancel requested, terminating process...\n");
        terminate(&mut child);

        let reaped = match timeout(CANCEL_GRACE, child.wait()).await {
            Ok(_) => true,
            Err(_) => {
                job.append("[INFO] Process did not terminate, killing...\n");
                let _ = child.start_kill();
                timeout(CANCEL_GRACE, child.wait()).await.is_ok()
            }
        };
        if !reaped {
            warn!("Job {}: process not reaped within the kill window", target);
            job.append("[WARN] Kill not confirmed within the grace period\n");
        }

        job.finish(CANCEL_EXIT_CODE, Some(JobStatus::Canceled));
        self.registry.clear_current_if(target).await;
        info!("Job {} canceled", target);
        (true, "Canceled".to_string())
    }
}

async fn run_stream(
    registry: Arc<JobRegistry>,
    job: Arc<Job>,
    command: Vec<String>,
    cwd: Option<PathBuf>,
) {
    let id = job.id;
    job.append(&format!("$ {}\n", shell_join(&command)));

    if command.is_empty() {
        job.append("[ERROR] Empty command\n");
        job.finish(1, None);
        registry.clear_current_if(id).await;
        return;
    }

    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &cwd {
        cmd.current_dir(dir);
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!("Job {}: failed to spawn {:?}: {}", id, command, e);
            job.append(&format!("\n[ERROR] Failed to spawn process: {}\n", e));
            job.finish(1, None);
            registry.clear_current_if(id).await;
            return;
        }
    };

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    job.attach_process(child).await;

    let mut readers: Vec<JoinHandle<()>> = Vec::new();
    if let Some(out) = stdout {
        readers.push(spawn_line_reader(job.clone(), out));
    }
    if let Some(err) = stderr {
        readers.push(spawn_line_reader(job.clone(), err));
    }
    for reader in readers {
        let _ = reader.await;
    }

    // A canceller may have taken the handle while we were draining output;
    // only the side holding the handle finalizes.
    if let Some(mut child) = job.take_process().await {
        match child.wait().await {
            Ok(status) => {
                let code = exit_code(&status);
                debug!("Job {} exited with code {}", id, code);
                job.finish(code, None);
            }
            Err(e) => {
                error!("Job {}: failed to reap process: {}", id, e);
                job.append(&format!("\n[ERROR] Failed to reap process: {}\n", e));
                job.finish(1, None);
            }
        }
    }

    registry.clear_current_if(id).await;
}

fn spawn_line_reader<R>(job: Arc<Job>, stream: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => job.append(&format!("{}\n", line)),
                Ok(None) => break,
                Err(e) => {
                    job.append(&format!("\n[ERROR] Output stream error: {}\n", e));
                    break;
                }
            }
        }
    })
}

fn terminate(child: &mut tokio::process::Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let _ = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        return;
    }

    // No pid (already reaped) or no signal support: go straight to the kill.
    let _ = child.start_kill();
}

fn exit_code(status: &std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return -signal;
        }
    }
    -1
}

fn shell_join(command: &[String]) -> String {
    command
        .iter()
        .map(|arg| {
            let needs_quoting = arg.is_empty()
                || arg
                    .chars()
                    .any(|c| c.is_whitespace() || "\"'\\$&|;<>()*?".contains(c));
            if needs_quoting {
                format!("'{}'", arg.replace('\'', r"'\''"))
            } else {
                arg.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
