//! Process supervisor - launches artifacts and streams their output into the registry
//!
//! `start_run` returns as soon as the child exists. A monitor task then owns
//! the child: one reader task per pipe appends chunks to the job record, the
//! monitor enforces the wall-clock limit, drains the readers and performs the
//! single `Completed` transition.
//!
//! Each child leads its own process group. Killing the group at the time
//! limit also takes down anything the program forked.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use crate::config::ExecutionConfig;
use crate::error::{CrunnerError, Result};
use crate::id::JobId;
use crate::jobs::record::JobSnapshot;
use crate::jobs::registry::{JobHandle, JobRegistry};
use crate::workspace::WorkspaceStore;

/// Exit code reported for a run killed at the time limit
pub const TIMEOUT_EXIT_CODE: i32 = 124;

/// Exit code reported when the child's status could not be collected
const UNKNOWN_EXIT_CODE: i32 = -1;

const READ_CHUNK_BYTES: usize = 8 * 1024;

/// Result of a start request
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub snapshot: JobSnapshot,
    /// False when the job already had a record and nothing was spawned
    pub started: bool,
}

/// Launches artifacts and supervises them until exit
#[derive(Debug, Clone)]
pub struct Supervisor {
    registry: Arc<JobRegistry>,
    workspace: WorkspaceStore,
    config: ExecutionConfig,
}

impl Supervisor {
    pub fn new(registry: Arc<JobRegistry>, workspace: WorkspaceStore, config: ExecutionConfig) -> Self {
        Self {
            registry,
            workspace,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    /// Start the artifact for `id` unless a record already exists
    pub async fn start_run(&self, id: &JobId) -> Result<StartOutcome> {
        if !self.workspace.artifact_exists(id).await {
            return Err(CrunnerError::ArtifactNotFound(id.to_string()));
        }
        let artifact = self.workspace.artifact_path(id);

        let (handle, created) = self.registry.get_or_create(id);
        if !created {
            tracing::debug!(job_id = %id, "Start requested for existing job");
            return Ok(StartOutcome {
                snapshot: handle.snapshot(),
                started: false,
            });
        }

        let child = match self.spawn(&artifact) {
            Ok(child) => child,
            Err(e) => {
                self.registry.discard(&handle);
                tracing::error!(job_id = %id, error = %e, "Failed to spawn artifact");
                return Err(CrunnerError::Spawn(format!("{}: {}", artifact.display(), e)));
            }
        };

        tracing::info!(job_id = %id, pid = ?child.id(), "Job started");
        let snapshot = handle.snapshot();
        tokio::spawn(supervise(
            Arc::clone(&self.registry),
            handle,
            child,
            self.config.timeout(),
            self.config.drain_grace(),
        ));

        Ok(StartOutcome {
            snapshot,
            started: true,
        })
    }

    fn spawn(&self, artifact: &Path) -> std::io::Result<Child> {
        let mut cmd = Command::new(artifact);
        cmd.env_clear()
            .env("PATH", &self.config.search_path)
            .current_dir(self.workspace.dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);
        cmd.spawn()
    }
}

/// Monitor one child from spawn to the `Completed` transition
async fn supervise(registry: Arc<JobRegistry>, handle: JobHandle, mut child: Child, limit: Duration, grace: Duration) {
    // The group id equals the leader's pid; read it before wait() reaps the leader
    let group = child.id();

    let mut readers: Vec<JoinHandle<()>> = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump(stdout, handle.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, handle.clone())));
    }

    let (exit_code, timed_out) = match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => (exit_code_of(status), false),
        Ok(Err(e)) => {
            tracing::warn!(job_id = %handle.id(), error = %e, "Failed to wait for child");
            (UNKNOWN_EXIT_CODE, false)
        }
        Err(_) => {
            tracing::info!(job_id = %handle.id(), limit_ms = limit.as_millis() as u64, "Job hit time limit, killing");
            if let Some(pgid) = group
                && let Err(e) = kill_group(pgid)
            {
                tracing::warn!(job_id = %handle.id(), error = %e, "Failed to kill process group");
            }
            if let Err(e) = child.kill().await {
                tracing::warn!(job_id = %handle.id(), error = %e, "Failed to kill child");
            }
            (TIMEOUT_EXIT_CODE, true)
        }
    };

    // Background processes left by a program that exited on its own go with it
    if !timed_out
        && let Some(pgid) = group
        && let Err(e) = kill_group(pgid)
    {
        tracing::debug!(job_id = %handle.id(), error = %e, "Failed to kill leftover processes");
    }

    // Descendants may still hold the pipes open; do not wait on them forever
    for mut reader in readers {
        if tokio::time::timeout(grace, &mut reader).await.is_err() {
            tracing::debug!(job_id = %handle.id(), "Output reader still open after exit, aborting");
            reader.abort();
        }
    }

    registry.complete(&handle, exit_code, timed_out);
}

/// Copy one pipe into the job record until EOF
async fn pump<R>(mut stream: R, handle: JobHandle)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                // Keep reading past the output cap so the child never blocks on a full pipe
                handle.append(&buf[..n]);
            }
            Err(e) => {
                tracing::debug!(job_id = %handle.id(), error = %e, "Output read failed");
                break;
            }
        }
    }
}

/// SIGKILL every process in the group led by `pgid`.
///
/// An already empty group is not an error.
#[cfg(unix)]
fn kill_group(pgid: u32) -> std::io::Result<()> {
    let pgid = libc::pid_t::try_from(pgid).map_err(|_| std::io::Error::from(std::io::ErrorKind::InvalidInput))?;
    // SAFETY: killpg only sends a signal; it does not touch our memory
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32) -> std::io::Result<()> {
    Ok(())
}

/// Exit code, or `128 + signal` for a signal-terminated process
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt as _;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    UNKNOWN_EXIT_CODE
}
