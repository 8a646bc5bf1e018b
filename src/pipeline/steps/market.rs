use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppError;
use crate::external::DataProviderClient;
use crate::models::payload::{JsonObject, TablePayload};
use crate::pipeline::step::{StepContext, StepExecutor};
use crate::pipeline::steps::{date_value, lookup, string_list, string_value};
use crate::services::{preprocessing, RateLimiter};
use crate::storage::StorageManager;

/// Fetches daily history for every requested symbol, quota-gated per call.
pub struct FetchMarketData {
    pub provider: Arc<dyn DataProviderClient>,
    pub quota: Arc<RateLimiter>,
}

#[async_trait]
impl StepExecutor for FetchMarketData {
    async fn execute(
        &self,
        params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let symbols = string_list(lookup(&ctx, params, "symbols"));
        let start = date_value(lookup(&ctx, params, "start_date"));
        let end = date_value(lookup(&ctx, params, "end_date"));

        let mut raw = JsonObject::new();
        for symbol in &symbols {
            let _permit = self.quota.acquire().await;
            let table = self.provider.fetch_market_data(symbol, start, end).await?;
            raw.insert(symbol.clone(), serde_json::to_value(table)?);
        }

        ctx.insert("raw_data".into(), Value::Object(raw));
        Ok(ctx)
    }
}

/// Cleans each fetched series and appends derived indicator columns.
pub struct TransformMarketData;

#[async_trait]
impl StepExecutor for TransformMarketData {
    async fn execute(
        &self,
        _params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let raw = ctx
            .get("raw_data")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput("context has no raw_data".into()))?;

        let mut processed = JsonObject::new();
        for (symbol, value) in raw {
            let table: TablePayload = serde_json::from_value(value)?;
            let cleaned = preprocessing::clean_table(table);
            let enriched = preprocessing::with_indicators(cleaned);
            processed.insert(symbol, serde_json::to_value(enriched)?);
        }

        ctx.insert("processed_data".into(), Value::Object(processed));
        Ok(ctx)
    }
}

/// Persists each processed series through the storage manager.
pub struct PersistMarketData {
    pub storage: Arc<StorageManager>,
}

#[async_trait]
impl StepExecutor for PersistMarketData {
    async fn execute(
        &self,
        params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let source =
            string_value(lookup(&ctx, params, "source")).unwrap_or_else(|| "default".into());
        let processed = ctx
            .get("processed_data")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput("context has no processed_data".into()))?;

        let mut storage_ids = JsonObject::new();
        for (symbol, value) in processed {
            let table: TablePayload = serde_json::from_value(value)?;
            let storage_id = self
                .storage
                .store_market_data(&symbol, table, &source)
                .await?;
            storage_ids.insert(symbol, Value::String(storage_id));
        }

        ctx.insert("storage_ids".into(), Value::Object(storage_ids));
        ctx.insert(
            "status".into(),
            Value::String("market data stored".to_string()),
        );
        Ok(ctx)
    }
}
