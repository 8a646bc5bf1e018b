use chrono::Utc;
use serde_json::Value;

use crate::models::payload::{JsonObject, TablePayload};

/// Simple Moving Average, aligned with `values`: `None` until `window`
/// values have been seen.
pub fn sma(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }

    values
        .iter()
        .enumerate()
        .scan(0.0_f64, move |sum, (i, &v)| {
            *sum += v;
            if i >= window {
                *sum -= values[i - window];
            }

            let out = if i + 1 >= window {
                Some(*sum / window as f64)
            } else {
                None
            };

            Some(out)
        })
        .collect()
}

/// Forward-fills missing numeric cells column by column, leaving the time
/// column untouched. Leading gaps stay null.
pub fn clean_table(mut table: TablePayload) -> TablePayload {
    let time_column = table.time_column().map(|c| c.to_string());

    for column in table.columns.clone() {
        if Some(&column) == time_column.as_ref() {
            continue;
        }
        let mut last_numeric: Option<Value> = None;
        for row in &mut table.rows {
            match row.get(&column) {
                Some(Value::Number(_)) => {
                    last_numeric = row.get(&column).cloned();
                }
                Some(Value::Null) | None => {
                    if let Some(fill) = &last_numeric {
                        row.insert(column.clone(), fill.clone());
                    }
                }
                _ => {}
            }
        }
    }

    table
}

fn closes(table: &TablePayload) -> Vec<f64> {
    table
        .rows
        .iter()
        .map(|row| row.get("close").and_then(Value::as_f64).unwrap_or(f64::NAN))
        .collect()
}

/// Appends derived indicator columns (daily return, 20-day SMA) computed
/// from the close series. Rows without a close are left untouched.
pub fn with_indicators(mut table: TablePayload) -> TablePayload {
    if !table.columns.iter().any(|c| c == "close") {
        return table;
    }

    let closes = closes(&table);
    let sma_20 = sma(&closes, 20);

    for col in ["return", "sma_20"] {
        if !table.columns.iter().any(|c| c == col) {
            table.columns.push(col.to_string());
        }
    }

    let mut prev_close: Option<f64> = None;
    for (i, row) in table.rows.iter_mut().enumerate() {
        let close = closes[i];
        if close.is_nan() {
            continue;
        }

        let daily_return = prev_close
            .filter(|p| *p != 0.0)
            .map(|p| (close - p) / p)
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        row.insert("return".into(), daily_return);

        let sma_value = sma_20[i]
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null);
        row.insert("sma_20".into(), sma_value);

        prev_close = Some(close);
    }

    table
}

/// Normalizes a fetched statement bundle: strips empty sections and stamps
/// the reporting period and latest date when the provider omitted them.
pub fn normalize_statements(mut data: JsonObject) -> JsonObject {
    data.retain(|_, value| match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    });

    if !data.contains_key("period") {
        data.insert("period".into(), Value::String("annual".into()));
    }
    if !data.contains_key("latest_date") {
        data.insert(
            "latest_date".into(),
            Value::String(Utc::now().date_naive().format("%Y-%m-%d").to_string()),
        );
    }

    data
}
