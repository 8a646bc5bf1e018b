use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::storage::backend::BackendKind;

/// Catalog row for one stored market-data series. Append-only: a new store
/// call for the same (symbol, source) writes a new row and retrieval picks
/// the most recent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataRecord {
    pub id: Uuid,
    pub symbol: String,
    pub source: String,
    pub storage_id: String,
    pub storage_backend: BackendKind,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub columns: Vec<String>,
    pub row_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalDataRecord {
    pub id: Uuid,
    pub symbol: String,
    pub source: String,
    pub storage_id: String,
    pub storage_backend: BackendKind,
    pub statements: Vec<String>,
    pub period: String,
    pub latest_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

/// `data_type` here is the bare subtype (e.g. `sentiment`), without the
/// `alternative_` prefix used in listings and scheduled-job labels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternativeDataRecord {
    pub id: Uuid,
    pub data_type: String,
    pub source: String,
    pub storage_id: String,
    pub storage_backend: BackendKind,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
