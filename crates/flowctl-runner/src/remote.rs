use async_trait::async_trait;
use chrono::{DateTime, Utc};
use flowctl_core::job_info::JobInfo;

use crate::error::Result;

/// A query against the remote job-listing endpoint.
#[derive(Debug, Clone)]
pub struct ListQuery {
    pub statuses: Vec<flowctl_core::job_info::JobStatus>,
    pub tags: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub reverse_chronological: bool,
}

/// The remote job-scheduling service: list/status/kill/share. This is the
/// programmatic, non-interactive surface — out of scope per the purpose
/// statement, this crate never implements a live HTTP client against it,
/// only the seam a real one would plug into.
#[async_trait]
pub trait RemoteJobs: Send + Sync {
    async fn list(&self, query: &ListQuery) -> Result<Vec<JobInfo>>;
    async fn status(&self, remote_id: &str) -> Result<JobInfo>;
    async fn kill(&self, remote_id: &str) -> Result<()>;
    async fn share(&self, uri: &str, role: &str) -> Result<()>;
}

/// Runs the external, TTY-bound CLI binary for the operations that are
/// naturally interactive sub-processes rather than API calls: `run`,
/// `attach`, `browse`, `logs`. The real one shells out to a
/// `neuro`/`neuro-extras`-equivalent binary; tests substitute a recording
/// fake.
#[async_trait]
pub trait CliRunner: Send + Sync {
    async fn exec(&self, argv: &[String]) -> Result<std::process::ExitStatus>;

    /// Like `exec`, but captures stdout instead of inheriting the parent's
    /// TTY — used for `logs`, whose output is consumed rather than streamed.
    async fn capture(&self, argv: &[String]) -> Result<String>;
}

/// The standard CLI runner: shells out via [`std::process::Command`].
pub struct StdCliRunner {
    pub program: String,
}

#[async_trait]
impl CliRunner for StdCliRunner {
    async fn exec(&self, argv: &[String]) -> Result<std::process::ExitStatus> {
        let program = self.program.clone();
        let argv = argv.to_vec();
        let status = tokio::task::spawn_blocking(move || {
            std::process::Command::new(&program).args(&argv).status()
        })
        .await
        .map_err(|e| {
            crate::error::RunnerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
        })??;
        Ok(status)
    }

    async fn capture(&self, argv: &[String]) -> Result<String> {
        let program = self.program.clone();
        let argv = argv.to_vec();
        let output = tokio::task::spawn_blocking(move || {
            std::process::Command::new(&program).args(&argv).output()
        })
        .await
        .map_err(|e| {
            crate::error::RunnerError::Io(std::io::Error::new(std::io::ErrorKind::Other, e))
        })??;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// A record of one `exec` call, captured by [`RecordingCliRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedExec {
    pub argv: Vec<String>,
}

/// A `CliRunner` that records invocations instead of running them, for
/// assertions in controller tests.
#[derive(Default)]
pub struct RecordingCliRunner {
    pub calls: std::sync::Mutex<Vec<RecordedExec>>,
}

#[async_trait]
impl CliRunner for RecordingCliRunner {
    async fn exec(&self, argv: &[String]) -> Result<std::process::ExitStatus> {
        self.calls.lock().unwrap().push(RecordedExec {
            argv: argv.to_vec(),
        });
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            Ok(std::process::ExitStatus::from_raw(0))
        }
        #[cfg(not(unix))]
        {
            Ok(std::process::Command::new("cmd")
                .arg("/C")
                .arg("exit 0")
                .status()
                .expect("recording runner fallback status"))
        }
    }

    async fn capture(&self, argv: &[String]) -> Result<String> {
        self.calls.lock().unwrap().push(RecordedExec {
            argv: argv.to_vec(),
        });
        Ok(String::new())
    }
}

/// A persisted record of a live job, written before the remote `run` call
/// so attach/restart discovery can find it even across process restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveJobRecord {
    pub multi: bool,
    pub yaml_id: String,
    pub tags: Vec<String>,
}

/// Persists the project's known live-job records. Out of scope as a real
/// backing store; a `MemoryProjectStorage` is provided for tests.
#[async_trait]
pub trait ProjectStorage: Send + Sync {
    async fn save_live_job(&self, record: LiveJobRecord) -> Result<()>;
    async fn list_live_jobs(&self) -> Result<Vec<LiveJobRecord>>;
}

#[derive(Default)]
pub struct MemoryProjectStorage {
    pub records: std::sync::Mutex<Vec<LiveJobRecord>>,
}

#[async_trait]
impl ProjectStorage for MemoryProjectStorage {
    async fn save_live_job(&self, record: LiveJobRecord) -> Result<()> {
        self.records.lock().unwrap().push(record);
        Ok(())
    }

    async fn list_live_jobs(&self) -> Result<Vec<LiveJobRecord>> {
        Ok(self.records.lock().unwrap().clone())
    }
}

/// Cloud-role management: creating a project role and sharing resource
/// URIs with it. Out of scope as a real implementation.
#[async_trait]
pub trait RoleManager: Send + Sync {
    async fn create_project_role(&self, name: &str) -> Result<()>;
    async fn share(&self, uri: &str, role: &str) -> Result<()>;
}
