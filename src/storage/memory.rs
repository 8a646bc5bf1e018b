use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::payload::Payload;
use crate::storage::backend::{BackendKind, StorageBackend, StorageMetadata};
use crate::storage::timeseries::{normalize_series, series_to_table};

/// In-memory backend honoring the same contract as the SQL-backed ones,
/// including time-series normalization when it stands in for that variant.
/// Used by tests and ephemeral single-process runs.
pub struct MemoryBackend {
    kind: BackendKind,
    items: DashMap<String, Payload>,
}

impl MemoryBackend {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            items: DashMap::new(),
        }
    }

    fn id_prefix(&self) -> &'static str {
        match self.kind {
            BackendKind::Structured => "sql",
            BackendKind::TimeSeries => "ts",
            BackendKind::Blob => "obj",
        }
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn store(
        &self,
        payload: &Payload,
        metadata: &StorageMetadata,
    ) -> Result<String, AppError> {
        let stored = if self.kind == BackendKind::TimeSeries {
            let table = payload.as_table().ok_or_else(|| {
                AppError::InvalidInput("time-series backend requires a table payload".to_string())
            })?;
            let series = normalize_series(table)?;
            Payload::Table(series_to_table(&series))
        } else {
            payload.clone()
        };

        let tag = metadata
            .symbol
            .clone()
            .unwrap_or_else(|| metadata.data_type.clone());
        let storage_id = format!("{}_{}_{}", self.id_prefix(), tag, Uuid::new_v4().simple());
        self.items.insert(storage_id.clone(), stored);
        Ok(storage_id)
    }

    async fn retrieve(&self, storage_id: &str) -> Result<Payload, AppError> {
        self.items
            .get(storage_id)
            .map(|p| p.clone())
            .ok_or_else(|| AppError::not_found(format!("storage id '{storage_id}'")))
    }

    async fn delete(&self, storage_id: &str) -> Result<bool, AppError> {
        Ok(self.items.remove(storage_id).is_some())
    }
}
