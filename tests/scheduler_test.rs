/// Scheduled-update orchestrator behavior over the in-memory stores: the
/// pause/resume/remove lifecycle, trigger restoration at startup, and the
/// full firing path (lazy pipeline construction, update-log creation, and
/// terminal finalization) driven by a real one-second interval trigger.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use quantdata_backend::errors::AppError;
use quantdata_backend::models::{
    JsonObject, ScheduleParams, ScheduleType, ScheduledJobStatus, UpdateStatus,
};
use quantdata_backend::pipeline::steps::{
    FETCH_MARKET_DATA, PERSIST_MARKET_DATA, TRANSFORM_MARKET_DATA,
};
use quantdata_backend::pipeline::{PipelineManager, StepContext, StepExecutor, StepRegistry};
use quantdata_backend::scheduler::ScheduledUpdateManager;
use quantdata_backend::store::MemoryStore;

struct NoopStep;

#[async_trait]
impl StepExecutor for NoopStep {
    async fn execute(
        &self,
        _params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        ctx.insert("touched".into(), json!(true));
        Ok(ctx)
    }
}

struct FailingStep;

#[async_trait]
impl StepExecutor for FailingStep {
    async fn execute(
        &self,
        _params: &JsonObject,
        _ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        Err(AppError::External("upstream returned 502".into()))
    }
}

fn pipelines(fetch_fails: bool) -> Arc<PipelineManager> {
    let registry = Arc::new(StepRegistry::new());
    if fetch_fails {
        registry.register(FETCH_MARKET_DATA, Arc::new(FailingStep));
    } else {
        registry.register(FETCH_MARKET_DATA, Arc::new(NoopStep));
    }
    registry.register(TRANSFORM_MARKET_DATA, Arc::new(NoopStep));
    registry.register(PERSIST_MARKET_DATA, Arc::new(NoopStep));

    Arc::new(PipelineManager::new(registry, Arc::new(MemoryStore::new())))
}

async fn orchestrator(
    store: Arc<MemoryStore>,
    fetch_fails: bool,
) -> (ScheduledUpdateManager, Arc<PipelineManager>) {
    let pipelines = pipelines(fetch_fails);
    let manager = ScheduledUpdateManager::new(pipelines.clone(), store)
        .await
        .unwrap()
        .with_poll_interval(Duration::from_millis(100));
    manager.start().await.unwrap();
    (manager, pipelines)
}

fn daily_at_2330() -> ScheduleParams {
    ScheduleParams {
        hour: Some(23),
        minute: Some(30),
        ..Default::default()
    }
}

/// The scheduler computes next-fire times on its internal tick; give it a
/// moment before asserting on them.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(750)).await;
}

#[tokio::test]
async fn pause_and_resume_toggle_status_and_live_trigger() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _) = orchestrator(store, false).await;

    let job_id = manager
        .schedule_market_data_update(
            vec!["AAPL".into()],
            "fmp",
            ScheduleType::Daily,
            daily_at_2330(),
        )
        .await
        .unwrap();
    settle().await;

    let info = manager.get_info(&job_id).await.unwrap();
    assert_eq!(info.job.status, ScheduledJobStatus::Active);
    assert!(info.next_run_time.is_some());

    assert!(manager.pause(&job_id).await);
    let info = manager.get_info(&job_id).await.unwrap();
    assert_eq!(info.job.status, ScheduledJobStatus::Paused);
    assert!(info.next_run_time.is_none());

    assert!(manager.resume(&job_id).await);
    settle().await;
    let info = manager.get_info(&job_id).await.unwrap();
    assert_eq!(info.job.status, ScheduledJobStatus::Active);
    assert!(info.next_run_time.is_some());
}

#[tokio::test]
async fn control_plane_calls_on_unknown_jobs_return_false() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _) = orchestrator(store, false).await;

    assert!(!manager.pause("no_such_job").await);
    assert!(!manager.resume("no_such_job").await);
    assert!(!manager.remove("no_such_job").await);
}

#[tokio::test]
async fn removed_jobs_are_terminal() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _) = orchestrator(store, false).await;

    let job_id = manager
        .schedule_market_data_update(
            vec!["AAPL".into()],
            "fmp",
            ScheduleType::Daily,
            daily_at_2330(),
        )
        .await
        .unwrap();

    assert!(manager.remove(&job_id).await);
    let info = manager.get_info(&job_id).await.unwrap();
    assert_eq!(info.job.status, ScheduledJobStatus::Removed);
    assert!(info.next_run_time.is_none());

    assert!(!manager.resume(&job_id).await);
    assert!(!manager.pause(&job_id).await);
}

#[tokio::test]
async fn list_filters_by_status_and_data_type() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _) = orchestrator(store, false).await;

    let market_id = manager
        .schedule_market_data_update(
            vec!["AAPL".into()],
            "fmp",
            ScheduleType::Daily,
            daily_at_2330(),
        )
        .await
        .unwrap();
    let fundamental_id = manager
        .schedule_fundamental_data_update(
            vec!["AAPL".into()],
            "fmp",
            ScheduleType::Weekly,
            ScheduleParams::default(),
        )
        .await
        .unwrap();

    manager.pause(&fundamental_id).await;

    let active = manager
        .list(None, None, Some(ScheduledJobStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].job.job_id, market_id);

    let fundamentals = manager
        .list(Some("fundamental_data"), None, None)
        .await
        .unwrap();
    assert_eq!(fundamentals.len(), 1);
    assert_eq!(fundamentals[0].job.job_id, fundamental_id);

    let none = manager
        .list(None, Some("unknown_source"), None)
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn load_active_jobs_restores_triggers_after_restart() {
    let store = Arc::new(MemoryStore::new());

    // First process: create one active and one paused schedule.
    {
        let (manager, _) = orchestrator(store.clone(), false).await;
        manager
            .schedule_market_data_update(
                vec!["AAPL".into()],
                "fmp",
                ScheduleType::Daily,
                daily_at_2330(),
            )
            .await
            .unwrap();
        let paused_id = manager
            .schedule_market_data_update(
                vec!["MSFT".into()],
                "fmp",
                ScheduleType::Daily,
                daily_at_2330(),
            )
            .await
            .unwrap();
        manager.pause(&paused_id).await;
        manager.shutdown().await.unwrap();
    }

    // Second process over the same persisted store: only the active row
    // gets a live trigger again.
    let (manager, _) = orchestrator(store, false).await;
    let restored = manager.load_active_jobs().await.unwrap();
    assert_eq!(restored, 1);
    settle().await;

    let active = manager
        .list(None, None, Some(ScheduledJobStatus::Active))
        .await
        .unwrap();
    assert_eq!(active.len(), 1);
    assert!(active[0].next_run_time.is_some());

    let paused = manager
        .list(None, None, Some(ScheduledJobStatus::Paused))
        .await
        .unwrap();
    assert_eq!(paused.len(), 1);
    assert!(paused[0].next_run_time.is_none());
}

async fn wait_for_terminal_log(
    manager: &ScheduledUpdateManager,
    job_id: &str,
) -> quantdata_backend::models::UpdateLog {
    for _ in 0..150 {
        let logs = manager
            .get_update_logs(Some(job_id), None, None, None, 10)
            .await
            .unwrap();
        if let Some(log) = logs.iter().find(|l| l.status != UpdateStatus::Running) {
            return log.clone();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("no terminal update log for {job_id}");
}

#[tokio::test]
async fn interval_trigger_fires_and_finalizes_the_update_log() {
    let store = Arc::new(MemoryStore::new());
    let (manager, pipelines) = orchestrator(store, false).await;

    let job_id = manager
        .schedule_market_data_update(
            vec!["AAPL".into()],
            "fmp",
            ScheduleType::Interval,
            ScheduleParams {
                seconds: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let log = wait_for_terminal_log(&manager, &job_id).await;
    assert_eq!(log.status, UpdateStatus::Completed);
    assert_eq!(log.data_type, "market_data");
    assert_eq!(log.source, "fmp");
    assert!(log.pipeline_job_id.is_some());
    assert!(log.end_time.unwrap() >= log.start_time);
    assert!(log.error.is_none());

    // The firing lazily constructed and registered the target pipeline.
    assert!(pipelines.list().contains(&"fmp_market_data_pipeline".to_string()));

    let info = manager.get_info(&job_id).await.unwrap();
    assert!(!info.recent_logs.is_empty());

    manager.remove(&job_id).await;
    manager.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_pipeline_runs_are_recorded_as_failed_updates() {
    let store = Arc::new(MemoryStore::new());
    let (manager, _) = orchestrator(store, true).await;

    let job_id = manager
        .schedule_market_data_update(
            vec!["AAPL".into()],
            "fmp",
            ScheduleType::Interval,
            ScheduleParams {
                seconds: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let log = wait_for_terminal_log(&manager, &job_id).await;
    assert_eq!(log.status, UpdateStatus::Failed);
    assert!(log.error.unwrap().contains(FETCH_MARKET_DATA));
    assert!(log.end_time.is_some());

    manager.remove(&job_id).await;
    manager.shutdown().await.unwrap();
}
