use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Job, JobStatus};
use crate::pipeline::engine::Pipeline;
use crate::pipeline::step::{StepContext, StepRegistry};
use crate::store::JobStore;

/// Registry of named pipelines plus the job table tracking their
/// executions. Each execution runs as an independent tokio task; the job
/// store is the source of truth for status, and the active-task map only
/// exists to support cancellation.
pub struct PipelineManager {
    pipelines: RwLock<HashMap<String, Pipeline>>,
    registry: Arc<StepRegistry>,
    jobs: Arc<dyn JobStore>,
    active: DashMap<String, JoinHandle<()>>,
    job_timeout: Option<std::time::Duration>,
}

impl PipelineManager {
    pub fn new(registry: Arc<StepRegistry>, jobs: Arc<dyn JobStore>) -> Self {
        Self {
            pipelines: RwLock::new(HashMap::new()),
            registry,
            jobs,
            active: DashMap::new(),
            job_timeout: None,
        }
    }

    /// Hardening knob: bound each execution's wall-clock time. Off by
    /// default; an expired job is marked failed like any step error.
    pub fn with_job_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.job_timeout = Some(timeout);
        self
    }

    /// Adds or overwrites a pipeline by name. Overwriting is allowed and
    /// logged, never an error.
    pub fn register(&self, pipeline: Pipeline) {
        let mut pipelines = self.pipelines.write();
        if pipelines.contains_key(&pipeline.name) {
            warn!("Pipeline {} already registered. Overwriting.", pipeline.name);
        }
        info!("Pipeline {} registered", pipeline.name);
        pipelines.insert(pipeline.name.clone(), pipeline);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.pipelines.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<Pipeline> {
        self.pipelines.read().get(name).cloned()
    }

    pub fn list(&self) -> Vec<String> {
        self.pipelines.read().keys().cloned().collect()
    }

    /// Creates a running job row and launches the execution as a background
    /// task, returning the job id immediately.
    pub async fn start(
        self: &Arc<Self>,
        name: &str,
        params: StepContext,
    ) -> Result<String, AppError> {
        let pipeline = self
            .get(name)
            .ok_or_else(|| AppError::not_found(format!("pipeline '{name}'")))?;

        let job_id = format!("{}_{}", name, Uuid::new_v4().simple());
        let job = Job::running(job_id.clone(), name.to_string(), Value::Object(params.clone()));
        self.jobs.insert_job(&job).await?;

        let manager = Arc::clone(self);
        let task_job_id = job_id.clone();
        let handle = tokio::spawn(async move {
            manager.run_pipeline(pipeline, task_job_id, params).await;
        });
        self.active.insert(job_id.clone(), handle);

        // A fast execution can finish before the insert above; don't leak
        // its map entry.
        let finished = self
            .active
            .get(&job_id)
            .map(|h| h.is_finished())
            .unwrap_or(false);
        if finished {
            self.active.remove(&job_id);
        }

        Ok(job_id)
    }

    async fn run_pipeline(&self, pipeline: Pipeline, job_id: String, params: StepContext) {
        info!("Starting pipeline execution: {}", job_id);

        let execution = pipeline.execute(&self.registry, params);
        let report = match self.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(report) => report,
                Err(_) => {
                    let message = format!("execution exceeded {}s", limit.as_secs());
                    error!("Pipeline execution timed out: {}: {}", job_id, message);
                    if let Err(e) = self.jobs.fail_job(&job_id, &message, &[]).await {
                        error!("Failed to record timeout of {}: {}", job_id, e);
                    }
                    self.active.remove(&job_id);
                    return;
                }
            },
            None => execution.await,
        };

        match report.error {
            None => {
                if let Err(e) = self
                    .jobs
                    .complete_job(&job_id, Value::Object(report.context), &report.trace)
                    .await
                {
                    error!("Failed to record completion of {}: {}", job_id, e);
                } else {
                    info!("Pipeline execution completed: {}", job_id);
                }
            }
            Some(message) => {
                error!("Pipeline execution failed: {}: {}", job_id, message);
                if let Err(e) = self.jobs.fail_job(&job_id, &message, &report.trace).await {
                    error!("Failed to record failure of {}: {}", job_id, e);
                }
            }
        }

        self.active.remove(&job_id);
    }

    /// NotFound when the id never existed; otherwise the persisted row.
    pub async fn get_status(&self, job_id: &str) -> Result<Job, AppError> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job '{job_id}'")))
    }

    pub async fn list_jobs(
        &self,
        pipeline_name: Option<&str>,
        status: Option<JobStatus>,
    ) -> Result<Vec<Job>, AppError> {
        self.jobs.list_jobs(pipeline_name, status).await
    }

    /// Best-effort cooperative cancellation: aborts the task (effective at
    /// its next suspension point) and marks the job cancelled. Returns false
    /// when the job is not running; completed steps' side effects are not
    /// rolled back.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let Some((_, handle)) = self.active.remove(job_id) else {
            warn!("Job {} not found or already completed", job_id);
            return false;
        };
        handle.abort();

        match self.jobs.cancel_job(job_id).await {
            Ok(changed) => {
                if changed {
                    info!("Job {} cancelled", job_id);
                } else {
                    warn!("Job {} finished before cancellation landed", job_id);
                }
                changed
            }
            Err(e) => {
                error!("Failed to record cancellation of {}: {}", job_id, e);
                false
            }
        }
    }
}
