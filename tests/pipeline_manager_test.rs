/// Pipeline manager behavior over the in-memory job store: registration
/// semantics, background execution, trace recording, halt-on-error, and
/// cancellation. No live database required.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use quantdata_backend::errors::AppError;
use quantdata_backend::models::{JobStatus, JsonObject, StepStatus};
use quantdata_backend::pipeline::{
    Pipeline, PipelineManager, StepContext, StepDescriptor, StepExecutor, StepRegistry,
};
use quantdata_backend::store::MemoryStore;

struct RecordStep {
    key: &'static str,
}

#[async_trait]
impl StepExecutor for RecordStep {
    async fn execute(
        &self,
        _params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        ctx.insert(self.key.to_string(), json!(true));
        Ok(ctx)
    }
}

struct FailingFetch;

#[async_trait]
impl StepExecutor for FailingFetch {
    async fn execute(
        &self,
        _params: &JsonObject,
        _ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        Err(AppError::External("provider connection refused".into()))
    }
}

struct SlowStep;

#[async_trait]
impl StepExecutor for SlowStep {
    async fn execute(
        &self,
        _params: &JsonObject,
        ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ctx)
    }
}

fn manager_with_registry() -> (Arc<PipelineManager>, Arc<StepRegistry>) {
    let registry = Arc::new(StepRegistry::new());
    registry.register("fetch", Arc::new(RecordStep { key: "fetched" }));
    registry.register("transform", Arc::new(RecordStep { key: "transformed" }));
    registry.register("persist", Arc::new(RecordStep { key: "persisted" }));
    registry.register("failing_fetch", Arc::new(FailingFetch));
    registry.register("slow", Arc::new(SlowStep));

    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(PipelineManager::new(registry.clone(), store));
    (manager, registry)
}

async fn wait_for_terminal(manager: &Arc<PipelineManager>, job_id: &str) -> JobStatus {
    for _ in 0..200 {
        let job = manager.get_status(job_id).await.unwrap();
        if job.status.is_terminal() {
            return job.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {job_id} did not reach a terminal status");
}

#[tokio::test]
async fn duplicate_registration_keeps_the_later_pipeline() {
    let (manager, _) = manager_with_registry();

    manager.register(Pipeline::new("dup", "first").add_step(StepDescriptor::new("fetch")));
    manager.register(
        Pipeline::new("dup", "second")
            .add_step(StepDescriptor::new("fetch"))
            .add_step(StepDescriptor::new("persist")),
    );

    assert_eq!(manager.list(), vec!["dup".to_string()]);
    let pipeline = manager.get("dup").unwrap();
    assert_eq!(pipeline.description, "second");
    assert_eq!(pipeline.steps.len(), 2);
}

#[tokio::test]
async fn start_of_unregistered_pipeline_is_not_found() {
    let (manager, _) = manager_with_registry();

    let err = manager
        .start("nowhere_pipeline", StepContext::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn get_status_of_unknown_job_is_not_found() {
    let (manager, _) = manager_with_registry();

    let err = manager.get_status("never_existed").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn completed_job_records_result_trace_and_end_time() {
    let (manager, _) = manager_with_registry();
    manager.register(
        Pipeline::new("happy", "")
            .add_step(StepDescriptor::new("fetch"))
            .add_step(StepDescriptor::new("transform"))
            .add_step(StepDescriptor::new("persist")),
    );

    let mut params = StepContext::new();
    params.insert("symbols".into(), json!(["AAPL"]));
    let job_id = manager.start("happy", params).await.unwrap();

    let status = wait_for_terminal(&manager, &job_id).await;
    assert_eq!(status, JobStatus::Completed);

    let job = manager.get_status(&job_id).await.unwrap();
    assert!(job.end_time.unwrap() >= job.start_time);
    assert_eq!(job.steps.len(), 3);
    assert!(job.steps.iter().all(|s| s.status == StepStatus::Success));

    let result = job.result.unwrap();
    assert_eq!(result["symbols"], json!(["AAPL"]));
    assert_eq!(result["fetched"], json!(true));
    assert_eq!(result["transformed"], json!(true));
    assert_eq!(result["persisted"], json!(true));
}

#[tokio::test]
async fn failing_fetch_halts_the_pipeline_before_persist() {
    let (manager, _) = manager_with_registry();
    manager.register(
        Pipeline::new("fmp_market_data_pipeline", "")
            .add_step(StepDescriptor::new("failing_fetch"))
            .add_step(StepDescriptor::new("transform"))
            .add_step(StepDescriptor::new("persist")),
    );

    let job_id = manager
        .start("fmp_market_data_pipeline", StepContext::new())
        .await
        .unwrap();

    let status = wait_for_terminal(&manager, &job_id).await;
    assert_eq!(status, JobStatus::Failed);

    let job = manager.get_status(&job_id).await.unwrap();
    assert_eq!(job.steps.len(), 1);
    assert_eq!(job.steps[0].status, StepStatus::Error);
    assert!(job.error.unwrap().contains("failing_fetch"));
    assert!(job.result.is_none());
}

#[tokio::test]
async fn trace_length_never_exceeds_step_count() {
    let (manager, _) = manager_with_registry();
    manager.register(
        Pipeline::new("bounded", "")
            .add_step(StepDescriptor::new("fetch"))
            .add_step(StepDescriptor::new("failing_fetch"))
            .add_step(StepDescriptor::new("persist")),
    );

    let job_id = manager.start("bounded", StepContext::new()).await.unwrap();
    let status = wait_for_terminal(&manager, &job_id).await;

    let job = manager.get_status(&job_id).await.unwrap();
    assert!(job.steps.len() <= 3);
    // A short trace implies failure, never silent truncation.
    assert_eq!(job.steps.len(), 2);
    assert_eq!(status, JobStatus::Failed);
}

#[tokio::test]
async fn cancel_interrupts_a_running_job() {
    let (manager, _) = manager_with_registry();
    manager.register(Pipeline::new("long", "").add_step(StepDescriptor::new("slow")));

    let job_id = manager.start("long", StepContext::new()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(manager.cancel(&job_id).await);

    let job = manager.get_status(&job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.end_time.is_some());
}

#[tokio::test]
async fn cancel_of_a_completed_job_returns_false_and_leaves_it_untouched() {
    let (manager, _) = manager_with_registry();
    manager.register(Pipeline::new("quick", "").add_step(StepDescriptor::new("fetch")));

    let job_id = manager.start("quick", StepContext::new()).await.unwrap();
    let status = wait_for_terminal(&manager, &job_id).await;
    assert_eq!(status, JobStatus::Completed);

    let before = manager.get_status(&job_id).await.unwrap();
    assert!(!manager.cancel(&job_id).await);

    let after = manager.get_status(&job_id).await.unwrap();
    assert_eq!(after.status, JobStatus::Completed);
    assert_eq!(after.end_time, before.end_time);
}

#[tokio::test]
async fn job_timeout_marks_the_job_failed() {
    let registry = Arc::new(StepRegistry::new());
    registry.register("slow", Arc::new(SlowStep));
    let manager = Arc::new(
        PipelineManager::new(registry, Arc::new(MemoryStore::new()))
            .with_job_timeout(Duration::from_millis(100)),
    );
    manager.register(Pipeline::new("long", "").add_step(StepDescriptor::new("slow")));

    let job_id = manager.start("long", StepContext::new()).await.unwrap();
    let status = wait_for_terminal(&manager, &job_id).await;
    assert_eq!(status, JobStatus::Failed);

    let job = manager.get_status(&job_id).await.unwrap();
    assert!(job.error.unwrap().contains("exceeded"));
}

#[tokio::test]
async fn concurrent_jobs_run_independently() {
    let (manager, _) = manager_with_registry();
    manager.register(Pipeline::new("a", "").add_step(StepDescriptor::new("fetch")));
    manager.register(Pipeline::new("b", "").add_step(StepDescriptor::new("persist")));

    let id_a = manager.start("a", StepContext::new()).await.unwrap();
    let id_b = manager.start("b", StepContext::new()).await.unwrap();

    assert_eq!(wait_for_terminal(&manager, &id_a).await, JobStatus::Completed);
    assert_eq!(wait_for_terminal(&manager, &id_b).await, JobStatus::Completed);

    let jobs = manager.list_jobs(None, Some(JobStatus::Completed)).await.unwrap();
    let ids: Vec<&str> = jobs.iter().map(|j| j.job_id.as_str()).collect();
    assert!(ids.contains(&id_a.as_str()));
    assert!(ids.contains(&id_b.as_str()));
}

#[tokio::test]
async fn params_seed_the_execution_context() {
    let (manager, _) = manager_with_registry();
    manager.register(Pipeline::new("seeded", "").add_step(StepDescriptor::new("fetch")));

    let mut params = StepContext::new();
    params.insert("source".into(), Value::String("fmp".into()));
    params.insert("scheduled".into(), json!(true));

    let job_id = manager.start("seeded", params).await.unwrap();
    wait_for_terminal(&manager, &job_id).await;

    let job = manager.get_status(&job_id).await.unwrap();
    assert_eq!(job.params["source"], json!("fmp"));
    let result = job.result.unwrap();
    assert_eq!(result["source"], json!("fmp"));
    assert_eq!(result["scheduled"], json!(true));
}
