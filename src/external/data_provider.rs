use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;

use crate::models::payload::{JsonObject, TablePayload};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,
}

/// Opaque data-provider client used inside fetch steps. Implementations
/// fetch by symbol; callers are expected to hold a rate-limiter permit
/// around every call.
#[async_trait]
pub trait DataProviderClient: Send + Sync {
    /// Daily OHLCV history for one symbol, optionally bounded by dates.
    async fn fetch_market_data(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TablePayload, ProviderError>;

    /// Financial statements keyed by statement type
    /// (income_statement / balance_sheet / cash_flow).
    async fn fetch_fundamentals(&self, symbol: &str) -> Result<JsonObject, ProviderError>;

    /// Alternative dataset of the given type, optionally scoped to symbols.
    async fn fetch_alternative_data(
        &self,
        data_type: &str,
        symbols: &[String],
    ) -> Result<Value, ProviderError>;
}
