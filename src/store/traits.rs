use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use crate::errors::AppError;
use crate::models::payload::JsonObject;
use crate::models::{
    AlternativeDataRecord, FundamentalDataRecord, Job, JobStatus, MarketDataRecord, ScheduledJob,
    ScheduledJobStatus, StepTrace, UpdateLog, UpdateStatus,
};

/// Persistence seam for pipeline executions. The Postgres implementation is
/// the production store; the in-memory one backs tests and ephemeral runs.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &Job) -> Result<(), AppError>;

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, AppError>;

    async fn list_jobs(
        &self,
        pipeline_name: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, AppError>;

    async fn complete_job(
        &self,
        job_id: &str,
        result: Value,
        steps: &[StepTrace],
    ) -> Result<(), AppError>;

    async fn fail_job(&self, job_id: &str, error: &str, steps: &[StepTrace])
        -> Result<(), AppError>;

    /// Transitions a running job to cancelled. Returns false when the job is
    /// unknown or already terminal; terminal rows are never overwritten.
    async fn cancel_job(&self, job_id: &str) -> Result<bool, AppError>;
}

#[derive(Debug, Clone, Default)]
pub struct ScheduledJobFilter {
    pub data_type: Option<String>,
    pub source: Option<String>,
    pub status: Option<ScheduledJobStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateLogFilter {
    pub job_id: Option<String>,
    pub data_type: Option<String>,
    pub source: Option<String>,
    pub status: Option<UpdateStatus>,
}

/// Persistence seam for scheduled-job definitions and their firing logs.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn insert_scheduled_job(&self, job: &ScheduledJob) -> Result<(), AppError>;

    async fn get_scheduled_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, AppError>;

    /// Returns false when no row matched the job id.
    async fn set_scheduled_job_status(
        &self,
        job_id: &str,
        status: ScheduledJobStatus,
    ) -> Result<bool, AppError>;

    async fn list_scheduled_jobs(
        &self,
        filter: &ScheduledJobFilter,
    ) -> Result<Vec<ScheduledJob>, AppError>;

    async fn insert_update_log(&self, log: &UpdateLog) -> Result<(), AppError>;

    async fn finalize_update_log(
        &self,
        pipeline_job_id: &str,
        status: UpdateStatus,
        end_time: DateTime<Utc>,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), AppError>;

    /// Newest first, truncated to `limit`.
    async fn list_update_logs(
        &self,
        filter: &UpdateLogFilter,
        limit: i64,
    ) -> Result<Vec<UpdateLog>, AppError>;
}

/// Persistence seam for the three dataset catalogs. Append-only: records are
/// versioned by `created_at` and the latest match wins on retrieval.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_market(&self, rec: &MarketDataRecord) -> Result<(), AppError>;

    async fn latest_market(
        &self,
        symbol: &str,
        source: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Option<MarketDataRecord>, AppError>;

    async fn list_market(
        &self,
        symbol: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<MarketDataRecord>, AppError>;

    async fn insert_fundamental(&self, rec: &FundamentalDataRecord) -> Result<(), AppError>;

    async fn latest_fundamental(
        &self,
        symbol: &str,
        source: &str,
    ) -> Result<Option<FundamentalDataRecord>, AppError>;

    async fn list_fundamental(
        &self,
        symbol: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<FundamentalDataRecord>, AppError>;

    async fn insert_alternative(&self, rec: &AlternativeDataRecord) -> Result<(), AppError>;

    async fn latest_alternative(
        &self,
        data_type: &str,
        source: &str,
        filters: Option<&JsonObject>,
    ) -> Result<Option<AlternativeDataRecord>, AppError>;

    async fn list_alternative(
        &self,
        data_type: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<AlternativeDataRecord>, AppError>;
}
