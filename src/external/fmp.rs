use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::external::data_provider::{DataProviderClient, ProviderError};
use crate::models::payload::{JsonObject, TablePayload};

const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com/api/v3";

pub struct FmpProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FmpProvider {
    pub fn from_env() -> Result<Self, ProviderError> {
        let api_key = std::env::var("FMP_API_KEY")
            .map_err(|_| ProviderError::BadResponse("FMP_API_KEY not set".into()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: std::env::var("FMP_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into()),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut query: Vec<(&str, String)> = query.to_vec();
        query.push(("apikey", self.api_key.clone()));

        let resp = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(ProviderError::BadResponse(format!(
                "{} returned {}",
                path,
                resp.status()
            )));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        // FMP reports plan limits inside a 200 body:
        // { "Error Message": "Limit Reach ..." }
        if let Some(message) = value.get("Error Message").and_then(Value::as_str) {
            if message.contains("Limit") {
                return Err(ProviderError::RateLimited);
            }
            return Err(ProviderError::BadResponse(message.to_string()));
        }

        Ok(value)
    }
}

#[derive(Debug, Deserialize)]
struct FmpHistoricalResponse {
    #[serde(default)]
    historical: Vec<FmpBar>,
}

#[derive(Debug, Deserialize)]
struct FmpBar {
    date: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
    #[serde(rename = "adjClose")]
    adj_close: Option<f64>,
}

fn bar_to_row(bar: &FmpBar) -> JsonObject {
    let mut row = JsonObject::new();
    row.insert("date".into(), Value::String(bar.date.clone()));
    row.insert("open".into(), json!(bar.open));
    row.insert("high".into(), json!(bar.high));
    row.insert("low".into(), json!(bar.low));
    row.insert("close".into(), json!(bar.close));
    row.insert("volume".into(), json!(bar.volume));
    row.insert("adjusted_close".into(), json!(bar.adj_close));
    row
}

#[async_trait]
impl DataProviderClient for FmpProvider {
    async fn fetch_market_data(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<TablePayload, ProviderError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(start) = start {
            query.push(("from", start.format("%Y-%m-%d").to_string()));
        }
        if let Some(end) = end {
            query.push(("to", end.format("%Y-%m-%d").to_string()));
        }

        let value = self
            .get_json(&format!("historical-price-full/{symbol}"), &query)
            .await?;
        let parsed: FmpHistoricalResponse =
            serde_json::from_value(value).map_err(|e| ProviderError::Parse(e.to_string()))?;

        // FMP serves newest-first; series consumers expect ascending time.
        let mut bars = parsed.historical;
        bars.reverse();

        let columns = vec![
            "date".to_string(),
            "open".to_string(),
            "high".to_string(),
            "low".to_string(),
            "close".to_string(),
            "volume".to_string(),
            "adjusted_close".to_string(),
        ];
        let rows = bars.iter().map(bar_to_row).collect();
        Ok(TablePayload { columns, rows })
    }

    async fn fetch_fundamentals(&self, symbol: &str) -> Result<JsonObject, ProviderError> {
        let mut statements = JsonObject::new();
        for (key, path) in [
            ("income_statement", "income-statement"),
            ("balance_sheet", "balance-sheet-statement"),
            ("cash_flow", "cash-flow-statement"),
        ] {
            let value = self
                .get_json(
                    &format!("{path}/{symbol}"),
                    &[("period", "annual".to_string()), ("limit", "4".to_string())],
                )
                .await?;
            statements.insert(key.to_string(), value);
        }
        Ok(statements)
    }

    async fn fetch_alternative_data(
        &self,
        data_type: &str,
        symbols: &[String],
    ) -> Result<Value, ProviderError> {
        match data_type {
            "news" | "sentiment" => {
                let tickers = symbols.join(",");
                let mut query: Vec<(&str, String)> = vec![("limit", "100".to_string())];
                if !tickers.is_empty() {
                    query.push(("tickers", tickers));
                }
                self.get_json("stock_news", &query).await
            }
            other => Err(ProviderError::BadResponse(format!(
                "unsupported alternative data type '{other}'"
            ))),
        }
    }
}
