use chrono::{DateTime, Utc};

/// The observable remote status of a job instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Unknown,
    Pending,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub const LIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::Running];
    pub const TERMINATED: [JobStatus; 4] = [
        JobStatus::Suspended,
        JobStatus::Succeeded,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    pub fn is_terminated(&self) -> bool {
        Self::TERMINATED.contains(self)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, JobStatus::Running)
    }
}

/// The controller's output for a discovered (or not-found) job instance.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInfo {
    /// Logical id, `"<J>"` or, for a multi-instance, `"<J> <suffix>"`.
    pub id: String,
    pub status: JobStatus,
    pub remote_id: String,
    pub tags: Vec<String>,
    pub when: DateTime<Utc>,
}

impl JobInfo {
    /// Extracts the value of a `key:` tag, e.g. `"job"` or `"multi"`.
    pub fn tag_value<'a>(&'a self, key: &str) -> Option<&'a str> {
        let prefix = format!("{key}:");
        self.tags
            .iter()
            .find_map(|t| t.strip_prefix(prefix.as_str()))
    }
}
