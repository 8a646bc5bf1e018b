use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::AppError;
use crate::external::DataProviderClient;
use crate::models::payload::JsonObject;
use crate::pipeline::step::{StepContext, StepExecutor};
use crate::pipeline::steps::{lookup, string_list, string_value};
use crate::services::{preprocessing, RateLimiter};
use crate::storage::StorageManager;

/// Fetches the statement bundle (income / balance sheet / cash flow) per
/// symbol.
pub struct FetchFundamentalData {
    pub provider: Arc<dyn DataProviderClient>,
    pub quota: Arc<RateLimiter>,
}

#[async_trait]
impl StepExecutor for FetchFundamentalData {
    async fn execute(
        &self,
        params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let symbols = string_list(lookup(&ctx, params, "symbols"));

        let mut raw = JsonObject::new();
        for symbol in &symbols {
            let _permit = self.quota.acquire().await;
            let statements = self.provider.fetch_fundamentals(symbol).await?;
            raw.insert(symbol.clone(), Value::Object(statements));
        }

        ctx.insert("raw_financial_data".into(), Value::Object(raw));
        Ok(ctx)
    }
}

/// Normalizes each statement bundle: drops empty sections, stamps period
/// and latest date. Ratio and valuation arithmetic live outside this
/// subsystem.
pub struct TransformFundamentalData;

#[async_trait]
impl StepExecutor for TransformFundamentalData {
    async fn execute(
        &self,
        _params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let raw = ctx
            .get("raw_financial_data")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| AppError::InvalidInput("context has no raw_financial_data".into()))?;

        let mut processed = JsonObject::new();
        for (symbol, value) in raw {
            let statements = value
                .as_object()
                .cloned()
                .ok_or_else(|| AppError::InvalidInput(format!("statements for {symbol} are not an object")))?;
            processed.insert(
                symbol,
                Value::Object(preprocessing::normalize_statements(statements)),
            );
        }

        ctx.insert("processed_financial_data".into(), Value::Object(processed));
        Ok(ctx)
    }
}

pub struct PersistFundamentalData {
    pub storage: Arc<StorageManager>,
}

#[async_trait]
impl StepExecutor for PersistFundamentalData {
    async fn execute(
        &self,
        params: &JsonObject,
        mut ctx: StepContext,
    ) -> Result<StepContext, AppError> {
        let source =
            string_value(lookup(&ctx, params, "source")).unwrap_or_else(|| "default".into());
        let processed = ctx
            .get("processed_financial_data")
            .and_then(Value::as_object)
            .cloned()
            .ok_or_else(|| {
                AppError::InvalidInput("context has no processed_financial_data".into())
            })?;

        let mut storage_ids = JsonObject::new();
        for (symbol, value) in processed {
            let statements = value.as_object().cloned().unwrap_or_default();
            let storage_id = self
                .storage
                .store_fundamental_data(&symbol, statements, &source)
                .await?;
            storage_ids.insert(symbol, Value::String(storage_id));
        }

        ctx.insert("storage_ids".into(), Value::Object(storage_ids));
        ctx.insert(
            "status".into(),
            Value::String("fundamental data stored".to_string()),
        );
        Ok(ctx)
    }
}
