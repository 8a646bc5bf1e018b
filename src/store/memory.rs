use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::errors::AppError;
use crate::models::payload::JsonObject;
use crate::models::{
    AlternativeDataRecord, FundamentalDataRecord, Job, JobStatus, MarketDataRecord, ScheduledJob,
    ScheduledJobStatus, StepTrace, UpdateLog, UpdateStatus,
};
use crate::store::traits::{
    CatalogStore, JobStore, ScheduleStore, ScheduledJobFilter, UpdateLogFilter,
};

/// In-memory persisted store. Same invariants as the Postgres store
/// (guarded cancel transition, append-only catalogs, newest-first reads);
/// used by the integration tests and for ephemeral single-process runs.
#[derive(Default)]
pub struct MemoryStore {
    jobs: DashMap<String, Job>,
    scheduled: DashMap<String, ScheduledJob>,
    logs: RwLock<Vec<UpdateLog>>,
    market: RwLock<Vec<MarketDataRecord>>,
    fundamental: RwLock<Vec<FundamentalDataRecord>>,
    alternative: RwLock<Vec<AlternativeDataRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &Job) -> Result<(), AppError> {
        self.jobs.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, AppError> {
        Ok(self.jobs.get(job_id).map(|j| j.clone()))
    }

    async fn list_jobs(
        &self,
        pipeline_name: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, AppError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .iter()
            .filter(|j| pipeline_name.map_or(true, |p| j.pipeline_name == p))
            .filter(|j| status.map_or(true, |s| j.status == s))
            .map(|j| j.clone())
            .collect();
        jobs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(jobs)
    }

    async fn complete_job(
        &self,
        job_id: &str,
        result: Value,
        steps: &[StepTrace],
    ) -> Result<(), AppError> {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.end_time = Some(Utc::now());
            job.result = Some(result);
            job.steps = steps.to_vec();
        }
        Ok(())
    }

    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        steps: &[StepTrace],
    ) -> Result<(), AppError> {
        if let Some(mut job) = self.jobs.get_mut(job_id) {
            job.status = JobStatus::Failed;
            job.end_time = Some(Utc::now());
            job.error = Some(error.to_string());
            job.steps = steps.to_vec();
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<bool, AppError> {
        match self.jobs.get_mut(job_id) {
            Some(mut job) if job.status == JobStatus::Running => {
                job.status = JobStatus::Cancelled;
                job.end_time = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn insert_scheduled_job(&self, job: &ScheduledJob) -> Result<(), AppError> {
        self.scheduled.insert(job.job_id.clone(), job.clone());
        Ok(())
    }

    async fn get_scheduled_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, AppError> {
        Ok(self.scheduled.get(job_id).map(|j| j.clone()))
    }

    async fn set_scheduled_job_status(
        &self,
        job_id: &str,
        status: ScheduledJobStatus,
    ) -> Result<bool, AppError> {
        match self.scheduled.get_mut(job_id) {
            Some(mut job) => {
                job.status = status;
                job.last_updated = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_scheduled_jobs(
        &self,
        filter: &ScheduledJobFilter,
    ) -> Result<Vec<ScheduledJob>, AppError> {
        let mut jobs: Vec<ScheduledJob> = self
            .scheduled
            .iter()
            .filter(|j| filter.data_type.as_deref().map_or(true, |d| j.data_type == d))
            .filter(|j| filter.source.as_deref().map_or(true, |s| j.source == s))
            .filter(|j| filter.status.map_or(true, |s| j.status == s))
            .map(|j| j.clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    async fn insert_update_log(&self, log: &UpdateLog) -> Result<(), AppError> {
        self.logs.write().push(log.clone());
        Ok(())
    }

    async fn finalize_update_log(
        &self,
        pipeline_job_id: &str,
        status: UpdateStatus,
        end_time: DateTime<Utc>,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), AppError> {
        let mut logs = self.logs.write();
        if let Some(log) = logs
            .iter_mut()
            .find(|l| l.pipeline_job_id.as_deref() == Some(pipeline_job_id))
        {
            log.status = status;
            log.end_time = Some(end_time);
            log.result = result;
            log.error = error;
        }
        Ok(())
    }

    async fn list_update_logs(
        &self,
        filter: &UpdateLogFilter,
        limit: i64,
    ) -> Result<Vec<UpdateLog>, AppError> {
        let logs = self.logs.read();
        let mut matches: Vec<UpdateLog> = logs
            .iter()
            .filter(|l| filter.job_id.as_deref().map_or(true, |j| l.job_id == j))
            .filter(|l| filter.data_type.as_deref().map_or(true, |d| l.data_type == d))
            .filter(|l| filter.source.as_deref().map_or(true, |s| l.source == s))
            .filter(|l| filter.status.map_or(true, |s| l.status == s))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        matches.truncate(limit.max(0) as usize);
        Ok(matches)
    }
}

fn metadata_matches(metadata: &Value, filters: Option<&JsonObject>) -> bool {
    match filters {
        None => true,
        Some(wanted) => wanted
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value)),
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_market(&self, rec: &MarketDataRecord) -> Result<(), AppError> {
        self.market.write().push(rec.clone());
        Ok(())
    }

    async fn latest_market(
        &self,
        symbol: &str,
        source: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Option<MarketDataRecord>, AppError> {
        let records = self.market.read();
        Ok(records
            .iter()
            .filter(|r| r.symbol == symbol && r.source == source)
            .filter(|r| match (start, r.end_date) {
                (Some(s), Some(e)) => e >= s,
                _ => true,
            })
            .filter(|r| match (end, r.start_date) {
                (Some(e), Some(s)) => s <= e,
                _ => true,
            })
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_market(
        &self,
        symbol: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<MarketDataRecord>, AppError> {
        let records = self.market.read();
        let mut matches: Vec<MarketDataRecord> = records
            .iter()
            .filter(|r| symbol.map_or(true, |s| r.symbol == s))
            .filter(|r| source.map_or(true, |s| r.source == s))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn insert_fundamental(&self, rec: &FundamentalDataRecord) -> Result<(), AppError> {
        self.fundamental.write().push(rec.clone());
        Ok(())
    }

    async fn latest_fundamental(
        &self,
        symbol: &str,
        source: &str,
    ) -> Result<Option<FundamentalDataRecord>, AppError> {
        let records = self.fundamental.read();
        Ok(records
            .iter()
            .filter(|r| r.symbol == symbol && r.source == source)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_fundamental(
        &self,
        symbol: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<FundamentalDataRecord>, AppError> {
        let records = self.fundamental.read();
        let mut matches: Vec<FundamentalDataRecord> = records
            .iter()
            .filter(|r| symbol.map_or(true, |s| r.symbol == s))
            .filter(|r| source.map_or(true, |s| r.source == s))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }

    async fn insert_alternative(&self, rec: &AlternativeDataRecord) -> Result<(), AppError> {
        self.alternative.write().push(rec.clone());
        Ok(())
    }

    async fn latest_alternative(
        &self,
        data_type: &str,
        source: &str,
        filters: Option<&JsonObject>,
    ) -> Result<Option<AlternativeDataRecord>, AppError> {
        let records = self.alternative.read();
        Ok(records
            .iter()
            .filter(|r| r.data_type == data_type && r.source == source)
            .filter(|r| metadata_matches(&r.metadata, filters))
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    async fn list_alternative(
        &self,
        data_type: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<AlternativeDataRecord>, AppError> {
        let records = self.alternative.read();
        let mut matches: Vec<AlternativeDataRecord> = records
            .iter()
            .filter(|r| data_type.map_or(true, |d| r.data_type == d))
            .filter(|r| source.map_or(true, |s| r.source == s))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matches)
    }
}
