use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::payload::{JsonObject, Payload};

/// The closed set of storage backends. Catalog rows record which variant
/// holds a payload, so retrieval can dispatch without string lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Structured,
    TimeSeries,
    Blob,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Structured => "structured",
            BackendKind::TimeSeries => "time_series",
            BackendKind::Blob => "blob",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "structured" => Some(BackendKind::Structured),
            "time_series" => Some(BackendKind::TimeSeries),
            "blob" => Some(BackendKind::Blob),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive context a backend receives alongside the payload: it feeds
/// storage-id generation, the schema registry, and tag columns.
#[derive(Debug, Clone, Default)]
pub struct StorageMetadata {
    pub data_type: String,
    pub symbol: Option<String>,
    pub source: String,
    pub extra: JsonObject,
}

impl StorageMetadata {
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = self.extra.clone();
        map.insert(
            "data_type".into(),
            serde_json::Value::String(self.data_type.clone()),
        );
        map.insert(
            "source".into(),
            serde_json::Value::String(self.source.clone()),
        );
        if let Some(symbol) = &self.symbol {
            map.insert("symbol".into(), serde_json::Value::String(symbol.clone()));
        }
        serde_json::Value::Object(map)
    }
}

/// Contract shared by all backends. `store` must be concurrency-safe and
/// return a globally unique storage id; `retrieve` fails NotFound for an
/// unknown id; `delete` reports false, not an error, when nothing existed.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn store(&self, payload: &Payload, metadata: &StorageMetadata)
        -> Result<String, AppError>;

    async fn retrieve(&self, storage_id: &str) -> Result<Payload, AppError>;

    async fn delete(&self, storage_id: &str) -> Result<bool, AppError>;
}
