use chrono::Utc;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{Job, JobStatus, StepTrace};

// Non-macro sqlx throughout: these tables are bootstrapped at runtime, so
// compile-time query verification has nothing to check against.

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown job status '{status}'").into()))?;
    let steps: Value = row.try_get("steps")?;

    Ok(Job {
        job_id: row.try_get("job_id")?,
        pipeline_name: row.try_get("pipeline_name")?,
        status,
        params: row.try_get("params")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        result: row.try_get("result")?,
        error: row.try_get("error")?,
        steps: serde_json::from_value(steps).unwrap_or_default(),
    })
}

fn steps_json(steps: &[StepTrace]) -> Value {
    serde_json::to_value(steps).unwrap_or_else(|_| Value::Array(Vec::new()))
}

pub async fn insert(pool: &PgPool, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (job_id, pipeline_name, status, params, start_time, end_time, result, error, steps)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&job.job_id)
    .bind(&job.pipeline_name)
    .bind(job.status.as_str())
    .bind(&job.params)
    .bind(job.start_time)
    .bind(job.end_time)
    .bind(&job.result)
    .bind(&job.error)
    .bind(steps_json(&job.steps))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch(pool: &PgPool, job_id: &str) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query("SELECT * FROM jobs WHERE job_id = $1")
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

pub async fn fetch_all(
    pool: &PgPool,
    pipeline_name: Option<&str>,
    status: Option<JobStatus>,
) -> Result<Vec<Job>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM jobs
        WHERE ($1::text IS NULL OR pipeline_name = $1)
          AND ($2::text IS NULL OR status = $2)
        ORDER BY start_time DESC
        "#,
    )
    .bind(pipeline_name)
    .bind(status.map(|s| s.as_str()))
    .fetch_all(pool)
    .await?;

    rows.iter().map(job_from_row).collect()
}

pub async fn mark_completed(
    pool: &PgPool,
    job_id: &str,
    result: &Value,
    steps: &[StepTrace],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed', end_time = $2, result = $3, steps = $4
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .bind(Utc::now())
    .bind(result)
    .bind(steps_json(steps))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn mark_failed(
    pool: &PgPool,
    job_id: &str,
    error: &str,
    steps: &[StepTrace],
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'failed', end_time = $2, error = $3, steps = $4
        WHERE job_id = $1
        "#,
    )
    .bind(job_id)
    .bind(Utc::now())
    .bind(error)
    .bind(steps_json(steps))
    .execute(pool)
    .await?;

    Ok(())
}

/// Guarded transition: only a still-running job can become cancelled, so a
/// terminal row is never overwritten by a racing cancel.
pub async fn mark_cancelled(pool: &PgPool, job_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'cancelled', end_time = $2
        WHERE job_id = $1 AND status = 'running'
        "#,
    )
    .bind(job_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
