use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppError;
use crate::external::DataProviderClient;
use crate::models::payload::{JsonObject, Payload};
use crate::pipeline::step::{StepContext, StepExecutor};
use crate::pipeline::steps::{lookup, string_list, string_value};
use crate::services::RateLimiter;
use crate::storage::StorageManager;

pub struct FetchAlternativeData {
    pub provider: Arc<dyn DataProviderClient>,
    pub quota: Arc<RateLimiter>,
}

#[async_trait]
impl StepExecutor for FetchAlternativeData {
    async fn execute(
        &self,
        params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let data_type = string_value(lookup(&ctx, params, "data_type"))
            .ok_or_else(|| AppError::InvalidInput("alternative fetch needs a data_type".into()))?;
        let symbols = string_list(lookup(&ctx, params, "symbols"));

        let _permit = self.quota.acquire().await;
        let data = self
            .provider
            .fetch_alternative_data(&data_type, &symbols)
            .await?;

        ctx.insert("raw_alternative_data".into(), data);
        Ok(ctx)
    }
}

/// Shapes the fetched dataset: tables pass through as tables, anything else
/// stays free-form JSON, and a record count is attached for the audit trail.
pub struct TransformAlternativeData;

#[async_trait]
impl StepExecutor for TransformAlternativeData {
    async fn execute(
        &self,
        _params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let raw = ctx
            .get("raw_alternative_data")
            .cloned()
            .ok_or_else(|| AppError::InvalidInput("context has no raw_alternative_data".into()))?;

        let record_count = match &raw {
            Value::Array(items) => items.len(),
            Value::Object(map) => map
                .get("rows")
                .and_then(Value::as_array)
                .map(|rows| rows.len())
                .unwrap_or(1),
            _ => 1,
        };

        ctx.insert("processed_alternative_data".into(), raw);
        ctx.insert("record_count".into(), Value::from(record_count));
        Ok(ctx)
    }
}

pub struct PersistAlternativeData {
    pub storage: Arc<StorageManager>,
}

#[async_trait]
impl StepExecutor for PersistAlternativeData {
    async fn execute(
        &self,
        params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let data_type = string_value(lookup(&ctx, params, "data_type"))
            .ok_or_else(|| AppError::InvalidInput("alternative persist needs a data_type".into()))?;
        let source =
            string_value(lookup(&ctx, params, "source")).unwrap_or_else(|| "default".into());
        let processed = ctx
            .get("processed_alternative_data")
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidInput("context has no processed_alternative_data".into())
            })?;

        let payload: Payload = serde_json::from_value(processed)?;

        let mut metadata = JsonObject::new();
        let symbols = string_list(lookup(&ctx, params, "symbols"));
        if !symbols.is_empty() {
            metadata.insert("symbols".into(), serde_json::to_value(&symbols)?);
        }
        if let Some(count) = ctx.get("record_count") {
            metadata.insert("record_count".into(), count.clone());
        }

        let storage_id = self
            .storage
            .store_alternative_data(payload, &data_type, Some(metadata), &source)
            .await?;

        ctx.insert("storage_id".into(), Value::String(storage_id));
        ctx.insert(
            "status".into(),
            Value::String(format!("{data_type} data stored")),
        );
        Ok(ctx)
    }
}
