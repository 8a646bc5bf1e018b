pub mod alternative;
pub mod fundamental;
pub mod market;

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;

use crate::external::DataProviderClient;
use crate::models::payload::JsonObject;
use crate::pipeline::step::StepRegistry;
use crate::services::RateLimiter;
use crate::storage::StorageManager;

pub const FETCH_MARKET_DATA: &str = "fetch_market_data";
pub const TRANSFORM_MARKET_DATA: &str = "transform_market_data";
pub const PERSIST_MARKET_DATA: &str = "persist_market_data";
pub const FETCH_FUNDAMENTAL_DATA: &str = "fetch_fundamental_data";
pub const TRANSFORM_FUNDAMENTAL_DATA: &str = "transform_fundamental_data";
pub const PERSIST_FUNDAMENTAL_DATA: &str = "persist_fundamental_data";
pub const FETCH_ALTERNATIVE_DATA: &str = "fetch_alternative_data";
pub const TRANSFORM_ALTERNATIVE_DATA: &str = "transform_alternative_data";
pub const PERSIST_ALTERNATIVE_DATA: &str = "persist_alternative_data";

/// Wires the standard fetch/transform/persist executors into a registry.
pub fn register_default_executors(
    registry: &StepRegistry,
    provider: Arc<dyn DataProviderClient>,
    storage: Arc<StorageManager>,
    quota: Arc<RateLimiter>,
) {
    registry.register(
        FETCH_MARKET_DATA,
        Arc::new(market::FetchMarketData {
            provider: provider.clone(),
            quota: quota.clone(),
        }),
    );
    registry.register(TRANSFORM_MARKET_DATA, Arc::new(market::TransformMarketData));
    registry.register(
        PERSIST_MARKET_DATA,
        Arc::new(market::PersistMarketData {
            storage: storage.clone(),
        }),
    );

    registry.register(
        FETCH_FUNDAMENTAL_DATA,
        Arc::new(fundamental::FetchFundamentalData {
            provider: provider.clone(),
            quota: quota.clone(),
        }),
    );
    registry.register(
        TRANSFORM_FUNDAMENTAL_DATA,
        Arc::new(fundamental::TransformFundamentalData),
    );
    registry.register(
        PERSIST_FUNDAMENTAL_DATA,
        Arc::new(fundamental::PersistFundamentalData {
            storage: storage.clone(),
        }),
    );

    registry.register(
        FETCH_ALTERNATIVE_DATA,
        Arc::new(alternative::FetchAlternativeData { provider, quota }),
    );
    registry.register(
        TRANSFORM_ALTERNATIVE_DATA,
        Arc::new(alternative::TransformAlternativeData),
    );
    registry.register(
        PERSIST_ALTERNATIVE_DATA,
        Arc::new(alternative::PersistAlternativeData { storage }),
    );
}

/// Runtime context wins over the parameters baked into the descriptor.
pub(crate) fn lookup<'a>(
    ctx: &'a JsonObject,
    params: &'a JsonObject,
    key: &str,
) -> Option<&'a Value> {
    ctx.get(key).or_else(|| params.get(key))
}

pub(crate) fn string_value(value: Option<&Value>) -> Option<String> {
    value.and_then(Value::as_str).map(|s| s.to_string())
}

pub(crate) fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) fn date_value(value: Option<&Value>) -> Option<NaiveDate> {
    value
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}
