use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: Uuid,
    pub input_file_path: String,
    pub output_dir: String,
    pub sha256: String,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Artifact URLs, present only when the output layout isolates jobs
    pub artifacts: Option<Vec<String>>,
    pub error: Option<String>,
}

impl JobRecord {
    pub fn running(id: Uuid, input: &Path, output_dir: &Path, sha256: &str) -> Self {
        Self {
            id,
            input_file_path: input.display().to_string(),
            output_dir: output_dir.display().to_string(),
            sha256: sha256.to_string(),
            status: JobStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            artifacts: None,
            error: None,
        }
    }
}

/// In-memory index of upload jobs.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<DashMap<Uuid, JobRecord>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a running job. If the handle is dropped before
    /// [`JobHandle::finish`] the job is marked cancelled.
    pub fn track(&self, record: JobRecord) -> JobHandle {
        let id = record.id;
        self.jobs.insert(id, record);
        JobHandle {
            registry: self.clone(),
            id,
            finished: false,
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<JobRecord> {
        self.jobs.get(id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Drops finished jobs that ended before `cutoff`. Running jobs are kept.
    pub fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let before = self.jobs.len();
        self.jobs
            .retain(|_, job| job.finished_at.is_none_or(|finished| finished >= cutoff));
        before.saturating_sub(self.jobs.len())
    }

    fn complete(
        &self,
        id: &Uuid,
        status: JobStatus,
        artifacts: Option<Vec<String>>,
        error: Option<String>,
    ) {
        if let Some(mut job) = self.jobs.get_mut(id) {
            job.status = status;
            job.finished_at = Some(Utc::now());
            job.artifacts = artifacts;
            job.error = error;
        }
    }
}

pub struct JobHandle {
    registry: JobRegistry,
    id: Uuid,
    finished: bool,
}

impl JobHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn finish(
        mut self,
        status: JobStatus,
        artifacts: Option<Vec<String>>,
        error: Option<String>,
    ) {
        self.registry.complete(&self.id, status, artifacts, error);
        self.finished = true;
    }
}

impl Drop for JobHandle {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("Job {} abandoned before completion (client disconnected?)", self.id);
            self.registry.complete(
                &self.id,
                JobStatus::Cancelled,
                None,
                Some("Request was dropped before processing finished".to_string()),
            );
        }
    }
}
