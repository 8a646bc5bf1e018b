/// Storage manager routing and catalog behavior over in-memory backends
/// and the in-memory catalog store. The memory time-series backend applies
/// the same normalization as the SQL one, so the market-data round trip
/// exercises real semantics.
use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};

use quantdata_backend::models::payload::{JsonObject, Payload, TablePayload};
use quantdata_backend::storage::{BackendKind, MemoryBackend, StorageManager};
use quantdata_backend::store::MemoryStore;

fn manager() -> StorageManager {
    let catalog = Arc::new(MemoryStore::new());
    let mut manager = StorageManager::new(catalog);
    manager.register_backend(Arc::new(MemoryBackend::new(BackendKind::Structured)));
    manager.register_backend(Arc::new(MemoryBackend::new(BackendKind::TimeSeries)));
    manager
}

fn ohlcv_row(time: &str, close: f64) -> JsonObject {
    let mut row = JsonObject::new();
    row.insert("time".into(), json!(time));
    row.insert("open".into(), json!(close - 0.5));
    row.insert("high".into(), json!(close + 1.0));
    row.insert("low".into(), json!(close - 1.0));
    row.insert("close".into(), json!(close));
    row.insert("volume".into(), json!(100_000.0));
    row.insert("adjusted_close".into(), json!(close));
    row
}

fn market_table() -> TablePayload {
    TablePayload::from_rows(vec![
        ohlcv_row("2024-01-02T00:00:00Z", 10.0),
        ohlcv_row("2024-01-03T00:00:00Z", 11.0),
        ohlcv_row("2024-02-01T00:00:00Z", 12.0),
    ])
}

#[tokio::test]
async fn market_data_round_trips_rows_columns_and_timestamps() {
    let manager = manager();
    let table = market_table();
    let expected_rows = table.row_count();
    let mut expected_columns = table.columns.clone();

    let storage_id = manager
        .store_market_data("AAPL", table, "fmp")
        .await
        .unwrap();
    assert!(storage_id.starts_with("ts_AAPL_"));

    let retrieved = manager
        .retrieve_market_data("AAPL", None, None, "fmp")
        .await
        .unwrap()
        .expect("stored series should be retrievable");

    assert_eq!(retrieved.row_count(), expected_rows);

    let mut actual_columns = retrieved.columns.clone();
    expected_columns.sort();
    actual_columns.sort();
    assert_eq!(actual_columns, expected_columns);

    assert_eq!(retrieved.rows[0]["time"], json!("2024-01-02T00:00:00Z"));
    assert_eq!(retrieved.rows[2]["time"], json!("2024-02-01T00:00:00Z"));
    assert_eq!(retrieved.rows[1]["close"], json!(11.0));
}

#[tokio::test]
async fn market_data_date_filters_apply_after_retrieval() {
    let manager = manager();
    manager
        .store_market_data("AAPL", market_table(), "fmp")
        .await
        .unwrap();

    let january = manager
        .retrieve_market_data(
            "AAPL",
            Some(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()),
            Some(NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()),
            "fmp",
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(january.row_count(), 2);
}

#[tokio::test]
async fn retrieving_unknown_market_data_is_none_not_an_error() {
    let manager = manager();
    let missing = manager
        .retrieve_market_data("ZZZZ", None, None, "fmp")
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn most_recent_market_store_wins() {
    let manager = manager();
    manager
        .store_market_data("AAPL", market_table(), "fmp")
        .await
        .unwrap();

    let newer = TablePayload::from_rows(vec![ohlcv_row("2024-03-01T00:00:00Z", 20.0)]);
    manager
        .store_market_data("AAPL", newer, "fmp")
        .await
        .unwrap();

    let retrieved = manager
        .retrieve_market_data("AAPL", None, None, "fmp")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(retrieved.row_count(), 1);
    assert_eq!(retrieved.rows[0]["close"], json!(20.0));
}

#[tokio::test]
async fn fundamental_data_round_trips_with_statement_filter() {
    let manager = manager();

    let mut data = JsonObject::new();
    data.insert("income_statement".into(), json!([{"revenue": 1000.0}]));
    data.insert("balance_sheet".into(), json!([{"assets": 5000.0}]));
    data.insert("period".into(), json!("annual"));
    data.insert("latest_date".into(), json!("2024-06-30"));

    let storage_id = manager
        .store_fundamental_data("MSFT", data, "fmp")
        .await
        .unwrap();
    assert!(storage_id.starts_with("sql_"));

    let full = manager
        .retrieve_fundamental_data("MSFT", None, "fmp")
        .await
        .unwrap()
        .unwrap();
    assert!(full.get("income_statement").is_some());
    assert!(full.get("balance_sheet").is_some());

    let only_income = manager
        .retrieve_fundamental_data("MSFT", Some("income_statement"), "fmp")
        .await
        .unwrap()
        .unwrap();
    assert!(only_income.get("income_statement").is_some());
    assert!(only_income.get("balance_sheet").is_none());
}

#[tokio::test]
async fn small_alternative_payloads_route_to_structured() {
    let manager = manager();

    let mut metadata = JsonObject::new();
    metadata.insert("provider_version".into(), json!("v4"));

    let storage_id = manager
        .store_alternative_data(
            Payload::Json(json!({"score": 0.73, "label": "bullish"})),
            "sentiment",
            Some(metadata),
            "fmp",
        )
        .await
        .unwrap();
    assert!(storage_id.starts_with("sql_"));

    let listed = manager
        .list_available_data(Some("alternative_sentiment"), None, None)
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["data_type"], json!("alternative_sentiment"));
    assert_eq!(listed[0]["source"], json!("fmp"));
    assert_eq!(listed[0]["provider_version"], json!("v4"));

    let retrieved = manager
        .retrieve_alternative_data("sentiment", None, "fmp")
        .await
        .unwrap()
        .unwrap();
    match retrieved {
        Payload::Json(value) => assert_eq!(value["score"], json!(0.73)),
        Payload::Table(_) => panic!("sentiment payload should not be tabular"),
    }
}

#[tokio::test]
async fn alternative_metadata_filters_select_matching_records() {
    let manager = manager();

    let mut meta_a = JsonObject::new();
    meta_a.insert("region".into(), json!("us"));
    manager
        .store_alternative_data(Payload::Json(json!({"v": 1})), "news", Some(meta_a), "fmp")
        .await
        .unwrap();

    let mut meta_b = JsonObject::new();
    meta_b.insert("region".into(), json!("eu"));
    manager
        .store_alternative_data(Payload::Json(json!({"v": 2})), "news", Some(meta_b), "fmp")
        .await
        .unwrap();

    let mut filters = JsonObject::new();
    filters.insert("region".into(), json!("us"));
    let retrieved = manager
        .retrieve_alternative_data("news", Some(&filters), "fmp")
        .await
        .unwrap()
        .unwrap();
    match retrieved {
        Payload::Json(value) => assert_eq!(value["v"], json!(1)),
        Payload::Table(_) => panic!("news payload should not be tabular"),
    }
}

#[tokio::test]
async fn list_available_data_merges_and_filters_catalogs() {
    let manager = manager();

    manager
        .store_market_data("AAPL", market_table(), "fmp")
        .await
        .unwrap();

    let mut statements = JsonObject::new();
    statements.insert("income_statement".into(), json!([{"revenue": 1.0}]));
    manager
        .store_fundamental_data("AAPL", statements, "fmp")
        .await
        .unwrap();

    manager
        .store_alternative_data(Payload::Json(json!({"s": 1})), "sentiment", None, "fmp")
        .await
        .unwrap();

    let everything = manager.list_available_data(None, None, None).await.unwrap();
    assert_eq!(everything.len(), 3);

    let market_only = manager
        .list_available_data(Some("market_data"), None, None)
        .await
        .unwrap();
    assert_eq!(market_only.len(), 1);
    assert_eq!(market_only[0]["symbol"], json!("AAPL"));

    let alternative_all = manager
        .list_available_data(Some("alternative_data"), None, None)
        .await
        .unwrap();
    assert_eq!(alternative_all.len(), 1);

    let wrong_symbol = manager
        .list_available_data(Some("market_data"), Some("MSFT"), None)
        .await
        .unwrap();
    assert!(wrong_symbol.is_empty());
}

#[tokio::test]
async fn storing_market_data_without_timestamps_is_invalid_input() {
    let manager = manager();

    let table = TablePayload::from_rows(vec![{
        let mut row = JsonObject::new();
        row.insert("close".into(), Value::from(10.0));
        row
    }]);

    let err = manager
        .store_market_data("AAPL", table, "fmp")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        quantdata_backend::errors::AppError::InvalidInput(_)
    ));

    // The failed store must not leave a catalog row behind.
    let listed = manager
        .list_available_data(Some("market_data"), Some("AAPL"), None)
        .await
        .unwrap();
    assert!(listed.is_empty());
}
