use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::payload::{JsonObject, Payload, TablePayload};
use crate::storage::backend::{BackendKind, StorageBackend, StorageMetadata};
use crate::storage::object_store::ObjectStore;
use crate::storage::structured::ensure_schema_entry;

/// Serializes large payloads (tables as CSV, everything else as JSON),
/// uploads them under a generated key to the object store, and records the
/// object key plus a parallel metadata object in the partition catalog.
pub struct BlobBackend {
    pool: PgPool,
    objects: Arc<dyn ObjectStore>,
}

impl BlobBackend {
    pub fn new(pool: PgPool, objects: Arc<dyn ObjectStore>) -> Self {
        Self { pool, objects }
    }
}

pub fn table_to_csv(table: &TablePayload) -> Result<Vec<u8>, AppError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(&table.columns)
        .map_err(|e| AppError::InvalidInput(format!("csv serialization: {e}")))?;

    for row in &table.rows {
        let record: Vec<String> = table
            .columns
            .iter()
            .map(|col| match row.get(col) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            })
            .collect();
        writer
            .write_record(&record)
            .map_err(|e| AppError::InvalidInput(format!("csv serialization: {e}")))?;
    }

    writer
        .into_inner()
        .map_err(|e| AppError::InvalidInput(format!("csv serialization: {e}")))
}

fn parse_csv_value(field: &str) -> Value {
    if field.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = field.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = field.parse::<f64>() {
        return Value::from(f);
    }
    match field {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => Value::String(field.to_string()),
    }
}

pub fn csv_to_table(bytes: &[u8]) -> Result<TablePayload, AppError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let columns: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::InvalidInput(format!("csv deserialization: {e}")))?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| AppError::InvalidInput(format!("csv deserialization: {e}")))?;
        let mut row = JsonObject::new();
        for (col, field) in columns.iter().zip(record.iter()) {
            row.insert(col.clone(), parse_csv_value(field));
        }
        rows.push(row);
    }

    Ok(TablePayload { columns, rows })
}

#[async_trait]
impl StorageBackend for BlobBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Blob
    }

    async fn store(
        &self,
        payload: &Payload,
        metadata: &StorageMetadata,
    ) -> Result<String, AppError> {
        let storage_id = format!("obj_{}_{}", metadata.data_type, Uuid::new_v4().simple());

        let (bytes, format) = match payload {
            Payload::Table(table) => (table_to_csv(table)?, "csv"),
            Payload::Json(value) => (serde_json::to_vec(value)?, "json"),
        };

        let object_key = format!("{storage_id}.{format}");
        let metadata_key = format!("{storage_id}_metadata.json");

        self.objects.put(&object_key, bytes).await?;
        self.objects
            .put(&metadata_key, serde_json::to_vec(&metadata.to_json())?)
            .await?;

        let schema_id =
            ensure_schema_entry(&self.pool, &metadata.data_type, payload.field_names()).await?;

        let mut partition_meta = match metadata.to_json() {
            Value::Object(map) => map,
            _ => JsonObject::new(),
        };
        partition_meta.insert("object_key".into(), Value::String(object_key));
        partition_meta.insert("metadata_key".into(), Value::String(metadata_key));
        partition_meta.insert("format".into(), Value::String(format.to_string()));

        sqlx::query(
            r#"
            INSERT INTO data_partitions (id, storage_id, schema_id, data, metadata, created_at)
            VALUES ($1, $2, $3, NULL, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&storage_id)
        .bind(schema_id)
        .bind(Value::Object(partition_meta))
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(storage_id)
    }

    async fn retrieve(&self, storage_id: &str) -> Result<Payload, AppError> {
        let meta = sqlx::query_scalar::<_, Value>(
            "SELECT metadata FROM data_partitions WHERE storage_id = $1",
        )
        .bind(storage_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found(format!("storage id '{storage_id}'")))?;

        let object_key = meta
            .get("object_key")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AppError::InvalidInput(format!("no object key recorded for '{storage_id}'"))
            })?;
        let format = meta.get("format").and_then(Value::as_str).unwrap_or("json");

        let bytes = self
            .objects
            .get(object_key)
            .await?
            .ok_or_else(|| AppError::not_found(format!("object '{object_key}'")))?;

        match format {
            "csv" => Ok(Payload::Table(csv_to_table(&bytes)?)),
            "json" => Ok(Payload::Json(serde_json::from_slice(&bytes)?)),
            other => Err(AppError::InvalidInput(format!(
                "unsupported blob format '{other}'"
            ))),
        }
    }

    async fn delete(&self, storage_id: &str) -> Result<bool, AppError> {
        let meta = sqlx::query_scalar::<_, Value>(
            "SELECT metadata FROM data_partitions WHERE storage_id = $1",
        )
        .bind(storage_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(meta) = meta else {
            return Ok(false);
        };

        for key_field in ["object_key", "metadata_key"] {
            if let Some(key) = meta.get(key_field).and_then(Value::as_str) {
                self.objects.delete(key).await?;
            }
        }

        sqlx::query("DELETE FROM data_partitions WHERE storage_id = $1")
            .bind(storage_id)
            .execute(&self.pool)
            .await?;

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_round_trips_tables() {
        let table = TablePayload {
            columns: vec!["time".into(), "close".into(), "note".into()],
            rows: vec![
                [
                    ("time".to_string(), json!("2024-01-02T00:00:00Z")),
                    ("close".to_string(), json!(11.5)),
                    ("note".to_string(), json!("split")),
                ]
                .into_iter()
                .collect(),
                [
                    ("time".to_string(), json!("2024-01-03T00:00:00Z")),
                    ("close".to_string(), json!(12.0)),
                    ("note".to_string(), Value::Null),
                ]
                .into_iter()
                .collect(),
            ],
        };

        let bytes = table_to_csv(&table).unwrap();
        let rebuilt = csv_to_table(&bytes).unwrap();

        assert_eq!(rebuilt.columns, table.columns);
        assert_eq!(rebuilt.row_count(), 2);
        assert_eq!(rebuilt.rows[0]["close"], json!(11.5));
        assert_eq!(rebuilt.rows[0]["note"], json!("split"));
        assert_eq!(rebuilt.rows[1]["note"], Value::Null);
    }
}
