use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::payload::Payload;
use crate::storage::backend::{BackendKind, StorageBackend, StorageMetadata};

/// Serializes arbitrary structured payloads into the `data_partitions` blob
/// column, registering the payload's field names in `data_schemas` the first
/// time a data type is seen.
pub struct StructuredBackend {
    pool: PgPool,
}

impl StructuredBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Lazily creates the schema-registry entry for `name` and returns its id.
/// Shared with the blob backend, which catalogs its uploads the same way.
pub(crate) async fn ensure_schema_entry(
    pool: &PgPool,
    name: &str,
    fields: Vec<String>,
) -> Result<Uuid, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO data_schemas (id, name, description, fields, created_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(name)
    .bind(format!("Schema for {name} data"))
    .bind(serde_json::to_value(fields).unwrap_or(Value::Null))
    .bind(Utc::now())
    .execute(pool)
    .await?;

    sqlx::query_scalar::<_, Uuid>("SELECT id FROM data_schemas WHERE name = $1")
        .bind(name)
        .fetch_one(pool)
        .await
}

#[async_trait]
impl StorageBackend for StructuredBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Structured
    }

    async fn store(
        &self,
        payload: &Payload,
        metadata: &StorageMetadata,
    ) -> Result<String, AppError> {
        let storage_id = format!(
            "sql_{}_{}",
            metadata.data_type,
            Uuid::new_v4().simple()
        );

        let data = serde_json::to_value(payload)?;
        let schema_id =
            ensure_schema_entry(&self.pool, &metadata.data_type, payload.field_names()).await?;

        sqlx::query(
            r#"
            INSERT INTO data_partitions (id, storage_id, schema_id, data, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&storage_id)
        .bind(schema_id)
        .bind(data)
        .bind(metadata.to_json())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(storage_id)
    }

    async fn retrieve(&self, storage_id: &str) -> Result<Payload, AppError> {
        let data = sqlx::query_scalar::<_, Option<Value>>(
            "SELECT data FROM data_partitions WHERE storage_id = $1",
        )
        .bind(storage_id)
        .fetch_optional(&self.pool)
        .await?;

        let data = data
            .flatten()
            .ok_or_else(|| AppError::not_found(format!("storage id '{storage_id}'")))?;

        Ok(serde_json::from_value(data)?)
    }

    async fn delete(&self, storage_id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM data_partitions WHERE storage_id = $1")
            .bind(storage_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
