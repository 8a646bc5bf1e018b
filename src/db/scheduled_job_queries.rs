use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{ScheduleType, ScheduledJob, ScheduledJobStatus};

fn scheduled_job_from_row(row: &PgRow) -> Result<ScheduledJob, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = ScheduledJobStatus::parse(&status).ok_or_else(|| {
        sqlx::Error::Decode(format!("unknown scheduled job status '{status}'").into())
    })?;
    let schedule_type: String = row.try_get("schedule_type")?;
    let schedule_type = ScheduleType::parse(&schedule_type)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown schedule type '{schedule_type}'").into()))?;
    let schedule_params: Value = row.try_get("schedule_params")?;
    let symbols: Value = row.try_get("symbols")?;

    Ok(ScheduledJob {
        job_id: row.try_get("job_id")?,
        name: row.try_get("name")?,
        data_type: row.try_get("data_type")?,
        source: row.try_get("source")?,
        schedule_type,
        schedule_params: serde_json::from_value(schedule_params).unwrap_or_default(),
        symbols: serde_json::from_value(symbols).unwrap_or_default(),
        status,
        created_at: row.try_get("created_at")?,
        last_updated: row.try_get("last_updated")?,
    })
}

pub async fn insert(pool: &PgPool, job: &ScheduledJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO scheduled_jobs
            (job_id, name, data_type, source, schedule_type, schedule_params, symbols, status, created_at, last_updated)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&job.job_id)
    .bind(&job.name)
    .bind(&job.data_type)
    .bind(&job.source)
    .bind(job.schedule_type.as_str())
    .bind(serde_json::to_value(&job.schedule_params).unwrap_or(Value::Null))
    .bind(serde_json::to_value(&job.symbols).unwrap_or(Value::Null))
    .bind(job.status.as_str())
    .bind(job.created_at)
    .bind(job.last_updated)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch(pool: &PgPool, job_id: &str) -> Result<Option<ScheduledJob>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM scheduled_jobs WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(scheduled_job_from_row).transpose()
}

pub async fn set_status(
    pool: &PgPool,
    job_id: &str,
    status: ScheduledJobStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE scheduled_jobs SET status = $2, last_updated = $3 WHERE job_id = $1",
    )
    .bind(job_id)
    .bind(status.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_filtered(
    pool: &PgPool,
    data_type: Option<&str>,
    source: Option<&str>,
    status: Option<ScheduledJobStatus>,
) -> Result<Vec<ScheduledJob>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM scheduled_jobs
        WHERE ($1::text IS NULL OR data_type = $1)
          AND ($2::text IS NULL OR source = $2)
          AND ($3::text IS NULL OR status = $3)
        ORDER BY created_at DESC
        "#,
    )
    .bind(data_type)
    .bind(source)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(scheduled_job_from_row).collect()
}
