use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{UpdateLog, UpdateStatus};

fn update_log_from_row(row: &PgRow) -> Result<UpdateLog, sqlx::Error> {
    let status: String = row.try_get("status")?;
    let status = UpdateStatus::parse(&status)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown update status '{status}'").into()))?;
    let symbols: Value = row.try_get("symbols")?;

    Ok(UpdateLog {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        pipeline_job_id: row.try_get("pipeline_job_id")?,
        data_type: row.try_get("data_type")?,
        source: row.try_get("source")?,
        status,
        symbols: serde_json::from_value(symbols).unwrap_or_default(),
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        result: row.try_get("result")?,
        error: row.try_get("error")?,
    })
}

pub async fn insert(pool: &PgPool, log: &UpdateLog) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO update_logs
            (id, job_id, pipeline_job_id, data_type, source, status, symbols, start_time, end_time, result, error)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(log.id)
    .bind(&log.job_id)
    .bind(&log.pipeline_job_id)
    .bind(&log.data_type)
    .bind(&log.source)
    .bind(log.status.as_str())
    .bind(serde_json::to_value(&log.symbols).unwrap_or(Value::Null))
    .bind(log.start_time)
    .bind(log.end_time)
    .bind(&log.result)
    .bind(&log.error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Writes the terminal outcome onto the row created when the firing started.
pub async fn finalize(
    pool: &PgPool,
    pipeline_job_id: &str,
    status: UpdateStatus,
    end_time: DateTime<Utc>,
    result: Option<&Value>,
    error: Option<&str>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE update_logs
        SET status = $2, end_time = $3, result = $4, error = $5
        WHERE pipeline_job_id = $1
        "#,
    )
    .bind(pipeline_job_id)
    .bind(status.as_str())
    .bind(end_time)
    .bind(result)
    .bind(error)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn fetch_filtered(
    pool: &PgPool,
    job_id: Option<&str>,
    data_type: Option<&str>,
    source: Option<&str>,
    status: Option<UpdateStatus>,
    limit: i64,
) -> Result<Vec<UpdateLog>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM update_logs
        WHERE ($1::text IS NULL OR job_id = $1)
          AND ($2::text IS NULL OR data_type = $2)
          AND ($3::text IS NULL OR source = $3)
          AND ($4::text IS NULL OR status = $4)
        ORDER BY start_time DESC
        LIMIT $5
        "#,
    )
    .bind(job_id)
    .bind(data_type)
    .bind(source)
    .bind(status.map(|s| s.as_str()))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(update_log_from_row).collect()
}
