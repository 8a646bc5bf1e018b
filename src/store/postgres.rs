use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::PgPool;

use crate::db::{catalog_queries, job_queries, scheduled_job_queries, update_log_queries};
use crate::errors::AppError;
use crate::models::payload::JsonObject;
use crate::models::{
    AlternativeDataRecord, FundamentalDataRecord, Job, JobStatus, MarketDataRecord, ScheduledJob,
    ScheduledJobStatus, StepTrace, UpdateLog, UpdateStatus,
};
use crate::store::traits::{
    CatalogStore, JobStore, ScheduleStore, ScheduledJobFilter, UpdateLogFilter,
};

/// Postgres-backed persisted store, delegating to the query modules in
/// `db/`. One instance wraps the process-wide pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn insert_job(&self, job: &Job) -> Result<(), AppError> {
        Ok(job_queries::insert(&self.pool, job).await?)
    }

    async fn get_job(&self, job_id: &str) -> Result<Option<Job>, AppError> {
        Ok(job_queries::fetch(&self.pool, job_id).await?)
    }

    async fn list_jobs(
        &self,
        pipeline_name: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, AppError> {
        Ok(job_queries::fetch_all(&self.pool, pipeline_name, status).await?)
    }

    async fn complete_job(
        &self,
        job_id: &str,
        result: Value,
        steps: &[StepTrace],
    ) -> Result<(), AppError> {
        Ok(job_queries::mark_completed(&self.pool, job_id, &result, steps).await?)
    }

    async fn fail_job(
        &self,
        job_id: &str,
        error: &str,
        steps: &[StepTrace],
    ) -> Result<(), AppError> {
        Ok(job_queries::mark_failed(&self.pool, job_id, error, steps).await?)
    }

    async fn cancel_job(&self, job_id: &str) -> Result<bool, AppError> {
        Ok(job_queries::mark_cancelled(&self.pool, job_id).await?)
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn insert_scheduled_job(&self, job: &ScheduledJob) -> Result<(), AppError> {
        Ok(scheduled_job_queries::insert(&self.pool, job).await?)
    }

    async fn get_scheduled_job(&self, job_id: &str) -> Result<Option<ScheduledJob>, AppError> {
        Ok(scheduled_job_queries::fetch(&self.pool, job_id).await?)
    }

    async fn set_scheduled_job_status(
        &self,
        job_id: &str,
        status: ScheduledJobStatus,
    ) -> Result<bool, AppError> {
        Ok(scheduled_job_queries::set_status(&self.pool, job_id, status).await?)
    }

    async fn list_scheduled_jobs(
        &self,
        filter: &ScheduledJobFilter,
    ) -> Result<Vec<ScheduledJob>, AppError> {
        Ok(scheduled_job_queries::fetch_filtered(
            &self.pool,
            filter.data_type.as_deref(),
            filter.source.as_deref(),
            filter.status,
        )
        .await?)
    }

    async fn insert_update_log(&self, log: &UpdateLog) -> Result<(), AppError> {
        Ok(update_log_queries::insert(&self.pool, log).await?)
    }

    async fn finalize_update_log(
        &self,
        pipeline_job_id: &str,
        status: UpdateStatus,
        end_time: DateTime<Utc>,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<(), AppError> {
        Ok(update_log_queries::finalize(
            &self.pool,
            pipeline_job_id,
            status,
            end_time,
            result.as_ref(),
            error.as_deref(),
        )
        .await?)
    }

    async fn list_update_logs(
        &self,
        filter: &UpdateLogFilter,
        limit: i64,
    ) -> Result<Vec<UpdateLog>, AppError> {
        Ok(update_log_queries::fetch_filtered(
            &self.pool,
            filter.job_id.as_deref(),
            filter.data_type.as_deref(),
            filter.source.as_deref(),
            filter.status,
            limit,
        )
        .await?)
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn insert_market(&self, rec: &MarketDataRecord) -> Result<(), AppError> {
        Ok(catalog_queries::insert_market(&self.pool, rec).await?)
    }

    async fn latest_market(
        &self,
        symbol: &str,
        source: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<Option<MarketDataRecord>, AppError> {
        Ok(catalog_queries::latest_market(&self.pool, symbol, source, start, end).await?)
    }

    async fn list_market(
        &self,
        symbol: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<MarketDataRecord>, AppError> {
        Ok(catalog_queries::list_market(&self.pool, symbol, source).await?)
    }

    async fn insert_fundamental(&self, rec: &FundamentalDataRecord) -> Result<(), AppError> {
        Ok(catalog_queries::insert_fundamental(&self.pool, rec).await?)
    }

    async fn latest_fundamental(
        &self,
        symbol: &str,
        source: &str,
    ) -> Result<Option<FundamentalDataRecord>, AppError> {
        Ok(catalog_queries::latest_fundamental(&self.pool, symbol, source).await?)
    }

    async fn list_fundamental(
        &self,
        symbol: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<FundamentalDataRecord>, AppError> {
        Ok(catalog_queries::list_fundamental(&self.pool, symbol, source).await?)
    }

    async fn insert_alternative(&self, rec: &AlternativeDataRecord) -> Result<(), AppError> {
        Ok(catalog_queries::insert_alternative(&self.pool, rec).await?)
    }

    async fn latest_alternative(
        &self,
        data_type: &str,
        source: &str,
        filters: Option<&JsonObject>,
    ) -> Result<Option<AlternativeDataRecord>, AppError> {
        Ok(catalog_queries::latest_alternative(&self.pool, data_type, source, filters).await?)
    }

    async fn list_alternative(
        &self,
        data_type: Option<&str>,
        source: Option<&str>,
    ) -> Result<Vec<AlternativeDataRecord>, AppError> {
        Ok(catalog_queries::list_alternative(&self.pool, data_type, source).await?)
    }
}
