use chrono::NaiveDate;
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::payload::JsonObject;
use crate::models::{AlternativeDataRecord, FundamentalDataRecord, MarketDataRecord};
use crate::storage::backend::BackendKind;

fn backend_from_row(row: &PgRow) -> Result<BackendKind, sqlx::Error> {
    let name: String = row.try_get("storage_backend")?;
    BackendKind::parse(&name)
        .ok_or_else(|| sqlx::Error::Decode(format!("unknown storage backend '{name}'").into()))
}

fn market_from_row(row: &PgRow) -> Result<MarketDataRecord, sqlx::Error> {
    let columns: Value = row.try_get("columns")?;
    Ok(MarketDataRecord {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        source: row.try_get("source")?,
        storage_id: row.try_get("storage_id")?,
        storage_backend: backend_from_row(row)?,
        start_date: row.try_get("start_date")?,
        end_date: row.try_get("end_date")?,
        columns: serde_json::from_value(columns).unwrap_or_default(),
        row_count: row.try_get("row_count")?,
        created_at: row.try_get("created_at")?,
    })
}

fn fundamental_from_row(row: &PgRow) -> Result<FundamentalDataRecord, sqlx::Error> {
    let statements: Value = row.try_get("statements")?;
    Ok(FundamentalDataRecord {
        id: row.try_get("id")?,
        symbol: row.try_get("symbol")?,
        source: row.try_get("source")?,
        storage_id: row.try_get("storage_id")?,
        storage_backend: backend_from_row(row)?,
        statements: serde_json::from_value(statements).unwrap_or_default(),
        period: row.try_get("period")?,
        latest_date: row.try_get("latest_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn alternative_from_row(row: &PgRow) -> Result<AlternativeDataRecord, sqlx::Error> {
    Ok(AlternativeDataRecord {
        id: row.try_get("id")?,
        data_type: row.try_get("data_type")?,
        source: row.try_get("source")?,
        storage_id: row.try_get("storage_id")?,
        storage_backend: backend_from_row(row)?,
        metadata: row.try_get("metadata")?,
        created_at: row.try_get("created_at")?,
    })
}

pub async fn insert_market(pool: &PgPool, rec: &MarketDataRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO market_data_catalog
            (id, symbol, source, storage_id, storage_backend, start_date, end_date, columns, row_count, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(rec.id)
    .bind(&rec.symbol)
    .bind(&rec.source)
    .bind(&rec.storage_id)
    .bind(rec.storage_backend.as_str())
    .bind(rec.start_date)
    .bind(rec.end_date)
    .bind(serde_json::to_value(&rec.columns).unwrap_or(Value::Null))
    .bind(rec.row_count)
    .bind(rec.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent catalog row for (symbol, source) whose stored date range
/// overlaps the requested window.
pub async fn latest_market(
    pool: &PgPool,
    symbol: &str,
    source: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Option<MarketDataRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT * FROM market_data_catalog
        WHERE symbol = $1 AND source = $2
          AND ($3::date IS NULL OR end_date IS NULL OR end_date >= $3)
          AND ($4::date IS NULL OR start_date IS NULL OR start_date <= $4)
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(symbol)
    .bind(source)
    .bind(start)
    .bind(end)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(market_from_row).transpose()
}

pub async fn list_market(
    pool: &PgPool,
    symbol: Option<&str>,
    source: Option<&str>,
) -> Result<Vec<MarketDataRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM market_data_catalog
        WHERE ($1::text IS NULL OR symbol = $1)
          AND ($2::text IS NULL OR source = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(symbol)
    .bind(source)
    .fetch_all(pool)
    .await?;

    rows.iter().map(market_from_row).collect()
}

pub async fn insert_fundamental(
    pool: &PgPool,
    rec: &FundamentalDataRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO fundamental_data_catalog
            (id, symbol, source, storage_id, storage_backend, statements, period, latest_date, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(rec.id)
    .bind(&rec.symbol)
    .bind(&rec.source)
    .bind(&rec.storage_id)
    .bind(rec.storage_backend.as_str())
    .bind(serde_json::to_value(&rec.statements).unwrap_or(Value::Null))
    .bind(&rec.period)
    .bind(rec.latest_date)
    .bind(rec.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn latest_fundamental(
    pool: &PgPool,
    symbol: &str,
    source: &str,
) -> Result<Option<FundamentalDataRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT * FROM fundamental_data_catalog
        WHERE symbol = $1 AND source = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(symbol)
    .bind(source)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(fundamental_from_row).transpose()
}

pub async fn list_fundamental(
    pool: &PgPool,
    symbol: Option<&str>,
    source: Option<&str>,
) -> Result<Vec<FundamentalDataRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM fundamental_data_catalog
        WHERE ($1::text IS NULL OR symbol = $1)
          AND ($2::text IS NULL OR source = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(symbol)
    .bind(source)
    .fetch_all(pool)
    .await?;

    rows.iter().map(fundamental_from_row).collect()
}

pub async fn insert_alternative(
    pool: &PgPool,
    rec: &AlternativeDataRecord,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO alternative_data_catalog
            (id, data_type, source, storage_id, storage_backend, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(rec.id)
    .bind(&rec.data_type)
    .bind(&rec.source)
    .bind(&rec.storage_id)
    .bind(rec.storage_backend.as_str())
    .bind(&rec.metadata)
    .bind(rec.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recent row for (data_type, source), optionally constrained by
/// metadata key equality (JSONB containment).
pub async fn latest_alternative(
    pool: &PgPool,
    data_type: &str,
    source: &str,
    filters: Option<&JsonObject>,
) -> Result<Option<AlternativeDataRecord>, sqlx::Error> {
    let filter_json = filters
        .map(|f| Value::Object(f.clone()))
        .unwrap_or_else(|| Value::Object(JsonObject::new()));

    let row = sqlx::query(
        r#"
        SELECT * FROM alternative_data_catalog
        WHERE data_type = $1 AND source = $2 AND metadata @> $3
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(data_type)
    .bind(source)
    .bind(filter_json)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(alternative_from_row).transpose()
}

pub async fn list_alternative(
    pool: &PgPool,
    data_type: Option<&str>,
    source: Option<&str>,
) -> Result<Vec<AlternativeDataRecord>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM alternative_data_catalog
        WHERE ($1::text IS NULL OR data_type = $1)
          AND ($2::text IS NULL OR source = $2)
        ORDER BY created_at DESC
        "#,
    )
    .bind(data_type)
    .bind(source)
    .fetch_all(pool)
    .await?;

    rows.iter().map(alternative_from_row).collect()
}
