use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tokio_cron_scheduler::{Job as CronJob, JobScheduler};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::payload::JsonObject;
use crate::models::{
    DataKind, ScheduleParams, ScheduleType, ScheduledJob, ScheduledJobInfo, ScheduledJobStatus,
    ScheduledJobSummary, UpdateLog, UpdateStatus,
};
use crate::pipeline::{factory, PipelineManager};
use crate::scheduler::trigger::{build_trigger, TriggerSpec};
use crate::store::{ScheduleStore, ScheduledJobFilter, UpdateLogFilter};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

type FiringFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

#[derive(Debug, Clone)]
struct UpdateTarget {
    job_id: String,
    kind: DataKind,
    source: String,
    symbols: Vec<String>,
}

/// Orchestrates recurring dataset updates: builds live triggers, persists
/// their definitions, and records every firing in the update log. One
/// instance per process; `load_active_jobs` rebuilds the live trigger set
/// from the persisted rows after a restart.
pub struct ScheduledUpdateManager {
    scheduler: JobScheduler,
    pipelines: Arc<PipelineManager>,
    store: Arc<dyn ScheduleStore>,
    triggers: DashMap<String, Uuid>,
    poll_interval: Duration,
}

impl ScheduledUpdateManager {
    pub async fn new(
        pipelines: Arc<PipelineManager>,
        store: Arc<dyn ScheduleStore>,
    ) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::Scheduling(format!("failed to create scheduler: {e}")))?;

        Ok(Self {
            scheduler,
            pipelines,
            store,
            triggers: DashMap::new(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub async fn start(&self) -> Result<(), AppError> {
        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::Scheduling(format!("failed to start scheduler: {e}")))?;
        info!("🚀 Scheduled update manager started");
        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.scheduler
            .clone()
            .shutdown()
            .await
            .map_err(|e| AppError::Scheduling(format!("failed to stop scheduler: {e}")))?;
        info!("🛑 Scheduled update manager stopped");
        Ok(())
    }

    pub async fn schedule_market_data_update(
        &self,
        symbols: Vec<String>,
        source: &str,
        schedule_type: ScheduleType,
        params: ScheduleParams,
    ) -> Result<String, AppError> {
        let job_id = format!("market_data_{}_{}", source, Uuid::new_v4().simple());
        let name = format!("Market Data Update ({source})");
        self.schedule_update(job_id, name, DataKind::Market, source, symbols, schedule_type, params)
            .await
    }

    pub async fn schedule_fundamental_data_update(
        &self,
        symbols: Vec<String>,
        source: &str,
        schedule_type: ScheduleType,
        params: ScheduleParams,
    ) -> Result<String, AppError> {
        let job_id = format!("fundamental_data_{}_{}", source, Uuid::new_v4().simple());
        let name = format!("Fundamental Data Update ({source})");
        self.schedule_update(
            job_id,
            name,
            DataKind::Fundamental,
            source,
            symbols,
            schedule_type,
            params,
        )
        .await
    }

    pub async fn schedule_alternative_data_update(
        &self,
        data_type: &str,
        source: &str,
        symbols: Vec<String>,
        schedule_type: ScheduleType,
        params: ScheduleParams,
    ) -> Result<String, AppError> {
        let job_id = format!(
            "alternative_data_{}_{}_{}",
            data_type,
            source,
            Uuid::new_v4().simple()
        );
        let name = format!("Alternative Data Update ({data_type}, {source})");
        self.schedule_update(
            job_id,
            name,
            DataKind::Alternative(data_type.to_string()),
            source,
            symbols,
            schedule_type,
            params,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn schedule_update(
        &self,
        job_id: String,
        name: String,
        kind: DataKind,
        source: &str,
        symbols: Vec<String>,
        schedule_type: ScheduleType,
        params: ScheduleParams,
    ) -> Result<String, AppError> {
        let trigger = build_trigger(schedule_type, &params)?;
        let target = UpdateTarget {
            job_id: job_id.clone(),
            kind: kind.clone(),
            source: source.to_string(),
            symbols: symbols.clone(),
        };
        let uuid = self.register_trigger(&trigger, self.firing_fn(target)).await?;
        self.triggers.insert(job_id.clone(), uuid);

        let now = Utc::now();
        let row = ScheduledJob {
            job_id: job_id.clone(),
            name: name.clone(),
            data_type: kind.label(),
            source: source.to_string(),
            schedule_type,
            schedule_params: params,
            symbols,
            status: ScheduledJobStatus::Active,
            created_at: now,
            last_updated: now,
        };
        self.store.insert_scheduled_job(&row).await?;

        info!("📅 Scheduled: {} [{}]", name, job_id);
        Ok(job_id)
    }

    fn firing_fn(&self, target: UpdateTarget) -> FiringFn {
        let pipelines = self.pipelines.clone();
        let store = self.store.clone();
        let poll_interval = self.poll_interval;
        Arc::new(move || {
            let pipelines = pipelines.clone();
            let store = store.clone();
            let target = target.clone();
            run_update(pipelines, store, poll_interval, target).boxed()
        })
    }

    async fn register_trigger(
        &self,
        trigger: &TriggerSpec,
        fire: FiringFn,
    ) -> Result<Uuid, AppError> {
        let job = match trigger {
            TriggerSpec::Cron(expr) => CronJob::new_async(expr.as_str(), move |_uuid, _sched| fire()),
            TriggerSpec::Every(interval) => {
                CronJob::new_repeated_async(*interval, move |_uuid, _sched| fire())
            }
        }
        .map_err(|e| AppError::Scheduling(format!("failed to create trigger: {e}")))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::Scheduling(format!("failed to add trigger: {e}")))
    }

    /// Rebuilds the live trigger for a persisted row. Used by resume and by
    /// the startup reload.
    async fn register_row(&self, row: &ScheduledJob) -> Result<(), AppError> {
        let kind = DataKind::parse(&row.data_type).ok_or_else(|| {
            AppError::Scheduling(format!("unknown data type '{}'", row.data_type))
        })?;
        let trigger = build_trigger(row.schedule_type, &row.schedule_params)?;
        let target = UpdateTarget {
            job_id: row.job_id.clone(),
            kind,
            source: row.source.clone(),
            symbols: row.symbols.clone(),
        };
        let uuid = self.register_trigger(&trigger, self.firing_fn(target)).await?;
        self.triggers.insert(row.job_id.clone(), uuid);
        Ok(())
    }

    async fn deregister_trigger(&self, job_id: &str) {
        if let Some((_, uuid)) = self.triggers.remove(job_id) {
            if let Err(e) = self.scheduler.remove(&uuid).await {
                error!("Failed to deregister trigger for {}: {}", job_id, e);
            }
        }
    }

    /// Pauses a job by deregistering its live trigger and persisting the
    /// paused status. Idempotent; false for unknown or removed jobs.
    pub async fn pause(&self, job_id: &str) -> bool {
        let row = match self.store.get_scheduled_job(job_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!("Scheduled job {} not found", job_id);
                return false;
            }
            Err(e) => {
                error!("Error pausing job {}: {}", job_id, e);
                return false;
            }
        };

        match row.status {
            ScheduledJobStatus::Removed => {
                warn!("Scheduled job {} is removed", job_id);
                false
            }
            ScheduledJobStatus::Paused => true,
            ScheduledJobStatus::Active => {
                self.deregister_trigger(job_id).await;
                match self
                    .store
                    .set_scheduled_job_status(job_id, ScheduledJobStatus::Paused)
                    .await
                {
                    Ok(changed) => {
                        info!("Job {} paused", job_id);
                        changed
                    }
                    Err(e) => {
                        error!("Error pausing job {}: {}", job_id, e);
                        false
                    }
                }
            }
        }
    }

    /// Resumes a paused job by rebuilding its trigger from the persisted
    /// row. Removed jobs are terminal and cannot be resumed.
    pub async fn resume(&self, job_id: &str) -> bool {
        let row = match self.store.get_scheduled_job(job_id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                warn!("Scheduled job {} not found", job_id);
                return false;
            }
            Err(e) => {
                error!("Error resuming job {}: {}", job_id, e);
                return false;
            }
        };

        match row.status {
            ScheduledJobStatus::Removed => {
                warn!("Scheduled job {} is removed and cannot be resumed", job_id);
                false
            }
            ScheduledJobStatus::Active => true,
            ScheduledJobStatus::Paused => {
                if let Err(e) = self.register_row(&row).await {
                    error!("Error resuming job {}: {}", job_id, e);
                    return false;
                }
                match self
                    .store
                    .set_scheduled_job_status(job_id, ScheduledJobStatus::Active)
                    .await
                {
                    Ok(changed) => {
                        info!("Job {} resumed", job_id);
                        changed
                    }
                    Err(e) => {
                        error!("Error resuming job {}: {}", job_id, e);
                        false
                    }
                }
            }
        }
    }

    /// Deregisters the trigger and marks the row removed (terminal).
    pub async fn remove(&self, job_id: &str) -> bool {
        match self.store.get_scheduled_job(job_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!("Scheduled job {} not found", job_id);
                return false;
            }
            Err(e) => {
                error!("Error removing job {}: {}", job_id, e);
                return false;
            }
        }

        self.deregister_trigger(job_id).await;
        match self
            .store
            .set_scheduled_job_status(job_id, ScheduledJobStatus::Removed)
            .await
        {
            Ok(changed) => {
                info!("Job {} removed", job_id);
                changed
            }
            Err(e) => {
                error!("Error removing job {}: {}", job_id, e);
                false
            }
        }
    }

    async fn next_run_time(&self, job_id: &str) -> Option<DateTime<Utc>> {
        let uuid = *self.triggers.get(job_id)?;
        self.scheduler
            .clone()
            .next_tick_for_job(uuid)
            .await
            .ok()
            .flatten()
    }

    /// Persisted row merged with the live next-fire time and the last five
    /// update-log entries.
    pub async fn get_info(&self, job_id: &str) -> Result<ScheduledJobInfo, AppError> {
        let job = self
            .store
            .get_scheduled_job(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("scheduled job '{job_id}'")))?;

        let next_run_time = self.next_run_time(job_id).await;
        let recent_logs = self
            .store
            .list_update_logs(
                &UpdateLogFilter {
                    job_id: Some(job_id.to_string()),
                    ..Default::default()
                },
                5,
            )
            .await?;

        Ok(ScheduledJobInfo {
            job,
            next_run_time,
            recent_logs,
        })
    }

    pub async fn list(
        &self,
        data_type: Option<&str>,
        source: Option<&str>,
        status: Option<ScheduledJobStatus>,
    ) -> Result<Vec<ScheduledJobSummary>, AppError> {
        let rows = self
            .store
            .list_scheduled_jobs(&ScheduledJobFilter {
                data_type: data_type.map(|s| s.to_string()),
                source: source.map(|s| s.to_string()),
                status,
            })
            .await?;

        let mut summaries = Vec::with_capacity(rows.len());
        for job in rows {
            let next_run_time = self.next_run_time(&job.job_id).await;
            summaries.push(ScheduledJobSummary { job, next_run_time });
        }
        Ok(summaries)
    }

    pub async fn get_update_logs(
        &self,
        job_id: Option<&str>,
        data_type: Option<&str>,
        source: Option<&str>,
        status: Option<UpdateStatus>,
        limit: i64,
    ) -> Result<Vec<UpdateLog>, AppError> {
        self.store
            .list_update_logs(
                &UpdateLogFilter {
                    job_id: job_id.map(|s| s.to_string()),
                    data_type: data_type.map(|s| s.to_string()),
                    source: source.map(|s| s.to_string()),
                    status,
                },
                limit,
            )
            .await
    }

    /// Re-registers the trigger and firing function of every active row.
    /// Called once at process start; rows with unrecognized definitions are
    /// logged and skipped so one bad row cannot block the rest.
    pub async fn load_active_jobs(&self) -> Result<usize, AppError> {
        let rows = self
            .store
            .list_scheduled_jobs(&ScheduledJobFilter {
                status: Some(ScheduledJobStatus::Active),
                ..Default::default()
            })
            .await?;

        let mut loaded = 0;
        for row in rows {
            match self.register_row(&row).await {
                Ok(()) => {
                    loaded += 1;
                    info!("Loaded scheduled job {} from store", row.job_id);
                }
                Err(e) => {
                    error!("Error loading scheduled job {}: {}", row.job_id, e);
                }
            }
        }

        info!("✅ Restored {} active scheduled jobs", loaded);
        Ok(loaded)
    }
}

/// One trigger firing: ensure the pipeline exists, start it, write the
/// running update-log row, then poll until the job is terminal and finalize
/// the log exactly once. A failure before the pipeline starts is written
/// directly as a failed log without touching the pipeline manager further.
async fn run_update(
    pipelines: Arc<PipelineManager>,
    store: Arc<dyn ScheduleStore>,
    poll_interval: Duration,
    target: UpdateTarget,
) {
    let data_type = target.kind.label();
    info!(
        "Running scheduled {} update for {} symbols from {}",
        data_type,
        target.symbols.len(),
        target.source
    );

    let started = async {
        let pipeline_name = factory::pipeline_name(&target.kind, &target.source);
        if !pipelines.contains(&pipeline_name) {
            pipelines.register(factory::build_pipeline(
                &target.kind,
                &target.source,
                &target.symbols,
            ));
        }

        let mut params = JsonObject::new();
        params.insert(
            "symbols".into(),
            Value::Array(target.symbols.iter().cloned().map(Value::String).collect()),
        );
        params.insert("source".into(), Value::String(target.source.clone()));
        params.insert("scheduled".into(), Value::Bool(true));
        params.insert("job_id".into(), Value::String(target.job_id.clone()));
        if let DataKind::Alternative(subtype) = &target.kind {
            params.insert("data_type".into(), Value::String(subtype.clone()));
        }

        pipelines.start(&pipeline_name, params).await
    }
    .await;

    let pipeline_job_id = match started {
        Ok(id) => id,
        Err(e) => {
            error!("Error in scheduled {} update: {}", data_type, e);
            let log = UpdateLog::failed(
                target.job_id.clone(),
                data_type,
                target.source.clone(),
                target.symbols.clone(),
                e.to_string(),
            );
            if let Err(e) = store.insert_update_log(&log).await {
                error!("Failed to write failed update log: {}", e);
            }
            return;
        }
    };

    let log = UpdateLog::running(
        target.job_id.clone(),
        pipeline_job_id.clone(),
        data_type.clone(),
        target.source.clone(),
        target.symbols.clone(),
    );
    if let Err(e) = store.insert_update_log(&log).await {
        error!("Failed to write update log: {}", e);
        return;
    }

    info!(
        "Scheduled {} update started with pipeline job id {}",
        data_type, pipeline_job_id
    );

    loop {
        match pipelines.get_status(&pipeline_job_id).await {
            Ok(job) if job.status.is_terminal() => {
                let status = UpdateStatus::from_job_status(job.status);
                let error = job.error.or_else(|| {
                    (status == UpdateStatus::Failed).then(|| "pipeline job cancelled".to_string())
                });
                if let Err(e) = store
                    .finalize_update_log(
                        &pipeline_job_id,
                        status,
                        job.end_time.unwrap_or_else(Utc::now),
                        job.result,
                        error,
                    )
                    .await
                {
                    error!("Failed to finalize update log: {}", e);
                }
                info!(
                    "Scheduled {} update completed with status {}",
                    data_type, job.status
                );
                return;
            }
            Ok(_) => {}
            Err(e) => {
                error!(
                    "Error polling pipeline job {} for {}: {}",
                    pipeline_job_id, data_type, e
                );
                if let Err(e) = store
                    .finalize_update_log(
                        &pipeline_job_id,
                        UpdateStatus::Failed,
                        Utc::now(),
                        None,
                        Some(e.to_string()),
                    )
                    .await
                {
                    error!("Failed to finalize update log: {}", e);
                }
                return;
            }
        }

        tokio::time::sleep(poll_interval).await;
    }
}
