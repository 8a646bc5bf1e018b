use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use quantdata_backend::db::schema;
use quantdata_backend::external::{DataProviderClient, FmpProvider};
use quantdata_backend::logging::{init_logging, LoggingConfig};
use quantdata_backend::pipeline::steps::register_default_executors;
use quantdata_backend::pipeline::{PipelineManager, StepRegistry};
use quantdata_backend::scheduler::ScheduledUpdateManager;
use quantdata_backend::services::RateLimiter;
use quantdata_backend::storage::{
    BlobBackend, FsObjectStore, StorageManager, StructuredBackend, TimeSeriesBackend,
};
use quantdata_backend::store::PgStore;

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    init_logging(LoggingConfig::from_env())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    schema::ensure_schema(&pool).await?;

    let provider_name =
        std::env::var("DATA_PROVIDER").unwrap_or_else(|_| "fmp".to_string());
    let provider: Arc<dyn DataProviderClient> = match provider_name.to_lowercase().as_str() {
        "fmp" => {
            tracing::info!("📊 Using data provider: Financial Modeling Prep");
            Arc::new(FmpProvider::from_env().context("failed to create FmpProvider")?)
        }
        other => anyhow::bail!("Invalid DATA_PROVIDER: {other}. Must be 'fmp'"),
    };

    let quota = Arc::new(RateLimiter::new(
        env_parse("PROVIDER_MAX_CONCURRENT", 3),
        env_parse("PROVIDER_REQUESTS_PER_MINUTE", 8),
    ));

    let store = Arc::new(PgStore::new(pool.clone()));

    let mut storage = StorageManager::new(store.clone());
    storage.register_backend(Arc::new(StructuredBackend::new(pool.clone())));
    storage.register_backend(Arc::new(TimeSeriesBackend::new(pool.clone())));
    let blob_enabled = env_parse("BLOB_STORAGE_ENABLED", false);
    if blob_enabled {
        let blob_root = std::env::var("BLOB_STORAGE_PATH")
            .context("BLOB_STORAGE_ENABLED is true but BLOB_STORAGE_PATH is not set")?;
        let objects = Arc::new(FsObjectStore::new(blob_root));
        storage.register_backend(Arc::new(BlobBackend::new(pool.clone(), objects)));
    }
    let storage = Arc::new(storage);

    let registry = Arc::new(StepRegistry::new());
    register_default_executors(&registry, provider, storage, quota);

    let mut pipelines = PipelineManager::new(registry, store.clone());
    let job_timeout_secs: u64 = env_parse("PIPELINE_JOB_TIMEOUT_SECS", 0);
    if job_timeout_secs > 0 {
        pipelines = pipelines.with_job_timeout(std::time::Duration::from_secs(job_timeout_secs));
    }
    let pipelines = Arc::new(pipelines);

    let scheduler = ScheduledUpdateManager::new(pipelines, store)
        .await?
        .with_poll_interval(std::time::Duration::from_secs(env_parse(
            "PIPELINE_POLL_INTERVAL_SECS",
            5,
        )));

    scheduler.load_active_jobs().await?;
    scheduler.start().await?;

    tracing::info!("🚀 quantdata backend running; press Ctrl-C to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    scheduler.shutdown().await?;
    Ok(())
}
