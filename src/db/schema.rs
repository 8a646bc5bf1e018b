use sqlx::PgPool;
use tracing::info;

/// Idempotent schema bootstrap for the data-infrastructure tables. The
/// shared time-series table is created lazily by its backend; everything
/// else is ensured here at process start.
pub async fn ensure_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    let statements = [
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            pipeline_name TEXT NOT NULL,
            status TEXT NOT NULL,
            params JSONB NOT NULL DEFAULT '{}'::jsonb,
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ NULL,
            result JSONB NULL,
            error TEXT NULL,
            steps JSONB NOT NULL DEFAULT '[]'::jsonb
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_jobs_pipeline ON jobs (pipeline_name, start_time DESC)",
        r#"
        CREATE TABLE IF NOT EXISTS scheduled_jobs (
            job_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            data_type TEXT NOT NULL,
            source TEXT NOT NULL,
            schedule_type TEXT NOT NULL,
            schedule_params JSONB NOT NULL DEFAULT '{}'::jsonb,
            symbols JSONB NOT NULL DEFAULT '[]'::jsonb,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            last_updated TIMESTAMPTZ NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_status ON scheduled_jobs (status)",
        r#"
        CREATE TABLE IF NOT EXISTS update_logs (
            id UUID PRIMARY KEY,
            job_id TEXT NOT NULL,
            pipeline_job_id TEXT NULL,
            data_type TEXT NOT NULL,
            source TEXT NOT NULL,
            status TEXT NOT NULL,
            symbols JSONB NOT NULL DEFAULT '[]'::jsonb,
            start_time TIMESTAMPTZ NOT NULL,
            end_time TIMESTAMPTZ NULL,
            result JSONB NULL,
            error TEXT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_update_logs_job ON update_logs (job_id, start_time DESC)",
        "CREATE INDEX IF NOT EXISTS idx_update_logs_pipeline_job ON update_logs (pipeline_job_id)",
        r#"
        CREATE TABLE IF NOT EXISTS market_data_catalog (
            id UUID PRIMARY KEY,
            symbol TEXT NOT NULL,
            source TEXT NOT NULL,
            storage_id TEXT NOT NULL,
            storage_backend TEXT NOT NULL,
            start_date DATE NULL,
            end_date DATE NULL,
            columns JSONB NOT NULL DEFAULT '[]'::jsonb,
            row_count BIGINT NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_market_catalog_symbol ON market_data_catalog (symbol, source, created_at DESC)",
        r#"
        CREATE TABLE IF NOT EXISTS fundamental_data_catalog (
            id UUID PRIMARY KEY,
            symbol TEXT NOT NULL,
            source TEXT NOT NULL,
            storage_id TEXT NOT NULL,
            storage_backend TEXT NOT NULL,
            statements JSONB NOT NULL DEFAULT '[]'::jsonb,
            period TEXT NOT NULL DEFAULT 'annual',
            latest_date DATE NULL,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_fundamental_catalog_symbol ON fundamental_data_catalog (symbol, source, created_at DESC)",
        r#"
        CREATE TABLE IF NOT EXISTS alternative_data_catalog (
            id UUID PRIMARY KEY,
            data_type TEXT NOT NULL,
            source TEXT NOT NULL,
            storage_id TEXT NOT NULL,
            storage_backend TEXT NOT NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_alternative_catalog_type ON alternative_data_catalog (data_type, source, created_at DESC)",
        r#"
        CREATE TABLE IF NOT EXISTS data_schemas (
            id UUID PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT NOT NULL DEFAULT '',
            fields JSONB NOT NULL DEFAULT '[]'::jsonb,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS data_partitions (
            id UUID PRIMARY KEY,
            storage_id TEXT NOT NULL UNIQUE,
            schema_id UUID NULL REFERENCES data_schemas (id),
            data JSONB NULL,
            metadata JSONB NOT NULL DEFAULT '{}'::jsonb,
            created_at TIMESTAMPTZ NOT NULL
        )
        "#,
        "CREATE INDEX IF NOT EXISTS idx_data_partitions_storage_id ON data_partitions (storage_id)",
    ];

    for ddl in statements {
        sqlx::query(ddl).execute(pool).await?;
    }

    info!("🗄️  Data-infrastructure schema ensured");
    Ok(())
}
