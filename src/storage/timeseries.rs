use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::payload::{format_timestamp, parse_timestamp, JsonObject, Payload, TablePayload};
use crate::storage::backend::{BackendKind, StorageBackend, StorageMetadata};

pub const SERIES_COLUMNS: [&str; 7] = [
    "time",
    "open",
    "high",
    "low",
    "close",
    "volume",
    "adjusted_close",
];

/// One normalized OHLCV observation headed for the shared series table.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesRow {
    pub time: DateTime<Utc>,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub adjusted_close: Option<f64>,
}

fn numeric(row: &JsonObject, key: &str) -> Option<f64> {
    row.get(key).and_then(Value::as_f64)
}

/// Normalizes a table to series rows. The table must carry a recognized
/// time column and every row must have a parseable timestamp; anything else
/// is InvalidInput rather than a silent row drop.
pub fn normalize_series(table: &TablePayload) -> Result<Vec<SeriesRow>, AppError> {
    let col = table.time_column().ok_or_else(|| {
        AppError::InvalidInput(
            "time-series payload requires a time, timestamp, or date column".to_string(),
        )
    })?;

    table
        .rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let time = row.get(col).and_then(parse_timestamp).ok_or_else(|| {
                AppError::InvalidInput(format!("row {i} has no parseable '{col}' timestamp"))
            })?;
            Ok(SeriesRow {
                time,
                open: numeric(row, "open"),
                high: numeric(row, "high"),
                low: numeric(row, "low"),
                close: numeric(row, "close"),
                volume: numeric(row, "volume"),
                adjusted_close: numeric(row, "adjusted_close"),
            })
        })
        .collect()
}

fn float_value(v: Option<f64>) -> Value {
    v.and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Rebuilds a table from series rows, with the canonical column set and
/// timestamps in canonical string form.
pub fn series_to_table(rows: &[SeriesRow]) -> TablePayload {
    let columns: Vec<String> = SERIES_COLUMNS.iter().map(|c| c.to_string()).collect();
    let rows = rows
        .iter()
        .map(|r| {
            let mut row = JsonObject::new();
            row.insert("time".into(), Value::String(format_timestamp(r.time)));
            row.insert("open".into(), float_value(r.open));
            row.insert("high".into(), float_value(r.high));
            row.insert("low".into(), float_value(r.low));
            row.insert("close".into(), float_value(r.close));
            row.insert("volume".into(), float_value(r.volume));
            row.insert("adjusted_close".into(), float_value(r.adjusted_close));
            row
        })
        .collect();
    TablePayload { columns, rows }
}

/// Appends normalized series into one shared time-indexed table, tagged by
/// storage id. The table and its indexes are created on first use.
pub struct TimeSeriesBackend {
    pool: PgPool,
    ready: OnceCell<()>,
}

impl TimeSeriesBackend {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            ready: OnceCell::new(),
        }
    }

    async fn ensure_table(&self) -> Result<(), AppError> {
        self.ready
            .get_or_try_init(|| async {
                let statements = [
                    r#"
                    CREATE TABLE IF NOT EXISTS market_timeseries (
                        time TIMESTAMPTZ NOT NULL,
                        symbol TEXT NOT NULL,
                        source TEXT NOT NULL,
                        storage_id TEXT NOT NULL,
                        open DOUBLE PRECISION NULL,
                        high DOUBLE PRECISION NULL,
                        low DOUBLE PRECISION NULL,
                        close DOUBLE PRECISION NULL,
                        volume DOUBLE PRECISION NULL,
                        adjusted_close DOUBLE PRECISION NULL
                    )
                    "#,
                    "CREATE INDEX IF NOT EXISTS idx_market_ts_symbol ON market_timeseries (symbol, time DESC)",
                    "CREATE INDEX IF NOT EXISTS idx_market_ts_storage_id ON market_timeseries (storage_id)",
                ];
                for ddl in statements {
                    sqlx::query(ddl).execute(&self.pool).await?;
                }
                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(AppError::Db)?;
        Ok(())
    }
}

fn series_row_from_pg(row: &PgRow) -> Result<SeriesRow, sqlx::Error> {
    Ok(SeriesRow {
        time: row.try_get("time")?,
        open: row.try_get("open")?,
        high: row.try_get("high")?,
        low: row.try_get("low")?,
        close: row.try_get("close")?,
        volume: row.try_get("volume")?,
        adjusted_close: row.try_get("adjusted_close")?,
    })
}

#[async_trait]
impl StorageBackend for TimeSeriesBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::TimeSeries
    }

    async fn store(
        &self,
        payload: &Payload,
        metadata: &StorageMetadata,
    ) -> Result<String, AppError> {
        let table = payload.as_table().ok_or_else(|| {
            AppError::InvalidInput("time-series backend requires a table payload".to_string())
        })?;

        // Validate the whole payload before any row is written.
        let series = normalize_series(table)?;

        self.ensure_table().await?;

        let symbol = metadata.symbol.as_deref().unwrap_or("data");
        let storage_id = format!("ts_{}_{}", symbol, Uuid::new_v4().simple());

        let mut tx = self.pool.begin().await?;
        for row in &series {
            sqlx::query(
                r#"
                INSERT INTO market_timeseries
                    (time, symbol, source, storage_id, open, high, low, close, volume, adjusted_close)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(row.time)
            .bind(symbol)
            .bind(&metadata.source)
            .bind(&storage_id)
            .bind(row.open)
            .bind(row.high)
            .bind(row.low)
            .bind(row.close)
            .bind(row.volume)
            .bind(row.adjusted_close)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(storage_id)
    }

    async fn retrieve(&self, storage_id: &str) -> Result<Payload, AppError> {
        self.ensure_table().await?;

        let rows = sqlx::query(
            r#"
            SELECT time, open, high, low, close, volume, adjusted_close
            FROM market_timeseries
            WHERE storage_id = $1
            ORDER BY time ASC
            "#,
        )
        .bind(storage_id)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(AppError::not_found(format!("storage id '{storage_id}'")));
        }

        let series = rows
            .iter()
            .map(series_row_from_pg)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Payload::Table(series_to_table(&series)))
    }

    async fn delete(&self, storage_id: &str) -> Result<bool, AppError> {
        self.ensure_table().await?;

        let result = sqlx::query("DELETE FROM market_timeseries WHERE storage_id = $1")
            .bind(storage_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(rows: Vec<Vec<(&str, Value)>>) -> TablePayload {
        TablePayload::from_rows(
            rows.into_iter()
                .map(|pairs| {
                    pairs
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect()
                })
                .collect(),
        )
    }

    #[test]
    fn rejects_tables_without_a_time_column() {
        let t = table(vec![vec![("close", json!(101.2)), ("volume", json!(5.0))]]);
        let err = normalize_series(&t).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn rejects_rows_with_unparseable_timestamps() {
        let t = table(vec![
            vec![("time", json!("2024-01-02T00:00:00Z")), ("close", json!(1.0))],
            vec![("time", json!("garbage")), ("close", json!(2.0))],
        ]);
        let err = normalize_series(&t).unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[test]
    fn normalization_round_trips_rows_columns_and_timestamps() {
        let t = table(vec![
            vec![
                ("time", json!("2024-01-02T00:00:00Z")),
                ("open", json!(10.0)),
                ("high", json!(11.5)),
                ("low", json!(9.8)),
                ("close", json!(11.0)),
                ("volume", json!(120000.0)),
                ("adjusted_close", json!(11.0)),
            ],
            vec![
                ("time", json!("2024-01-03T00:00:00Z")),
                ("open", json!(11.0)),
                ("high", json!(12.0)),
                ("low", json!(10.9)),
                ("close", json!(11.8)),
                ("volume", json!(98000.0)),
                ("adjusted_close", json!(11.8)),
            ],
        ]);

        let series = normalize_series(&t).unwrap();
        let rebuilt = series_to_table(&series);

        assert_eq!(rebuilt.row_count(), t.row_count());

        let mut expected: Vec<&str> = t.columns.iter().map(|c| c.as_str()).collect();
        let mut actual: Vec<&str> = rebuilt.columns.iter().map(|c| c.as_str()).collect();
        expected.sort_unstable();
        actual.sort_unstable();
        assert_eq!(actual, expected);

        for (orig, round) in t.rows.iter().zip(rebuilt.rows.iter()) {
            assert_eq!(round["time"], orig["time"]);
            assert_eq!(round["close"], orig["close"]);
        }
    }

    #[test]
    fn extra_columns_are_dropped_by_normalization() {
        let t = table(vec![vec![
            ("date", json!("2024-01-02")),
            ("close", json!(11.0)),
            ("sma_20", json!(10.4)),
        ]]);
        let series = normalize_series(&t).unwrap();
        let rebuilt = series_to_table(&series);
        assert!(!rebuilt.columns.iter().any(|c| c == "sma_20"));
        assert_eq!(rebuilt.rows[0]["close"], json!(11.0));
    }
}
