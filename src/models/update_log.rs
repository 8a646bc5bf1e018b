use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::job::JobStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Running,
    Completed,
    Failed,
}

impl UpdateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStatus::Running => "running",
            UpdateStatus::Completed => "completed",
            UpdateStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(UpdateStatus::Running),
            "completed" => Some(UpdateStatus::Completed),
            "failed" => Some(UpdateStatus::Failed),
            _ => None,
        }
    }

    /// Terminal pipeline statuses collapse onto the update-log taxonomy; a
    /// cancelled pipeline run counts as a failed update.
    pub fn from_job_status(status: JobStatus) -> Self {
        match status {
            JobStatus::Completed => UpdateStatus::Completed,
            JobStatus::Running => UpdateStatus::Running,
            JobStatus::Failed | JobStatus::Cancelled => UpdateStatus::Failed,
        }
    }
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record of one trigger firing, written once when the firing starts
/// and updated once with the terminal outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLog {
    pub id: Uuid,
    pub job_id: String,
    pub pipeline_job_id: Option<String>,
    pub data_type: String,
    pub source: String,
    pub status: UpdateStatus,
    pub symbols: Vec<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl UpdateLog {
    pub fn running(
        job_id: String,
        pipeline_job_id: String,
        data_type: String,
        source: String,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            pipeline_job_id: Some(pipeline_job_id),
            data_type,
            source,
            status: UpdateStatus::Running,
            symbols,
            start_time: Utc::now(),
            end_time: None,
            result: None,
            error: None,
        }
    }

    /// A firing that failed before the pipeline manager was ever invoked.
    pub fn failed(
        job_id: String,
        data_type: String,
        source: String,
        symbols: Vec<String>,
        error: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            job_id,
            pipeline_job_id: None,
            data_type,
            source,
            status: UpdateStatus::Failed,
            symbols,
            start_time: now,
            end_time: Some(now),
            result: None,
            error: Some(error),
        }
    }
}
