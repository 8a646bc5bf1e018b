use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JsonObject = serde_json::Map<String, Value>;

/// Column names recognized as the time index of a table payload.
pub const TIME_COLUMNS: [&str; 3] = ["time", "timestamp", "date"];

/// A stored dataset is either tabular (market series, large alternative
/// tables) or free-form JSON (fundamental snapshots, small alternative
/// payloads). Untagged so that tabular JSON round-trips through the
/// structured backend without a wrapper object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Table(TablePayload),
    Json(Value),
}

impl Payload {
    pub fn as_table(&self) -> Option<&TablePayload> {
        match self {
            Payload::Table(t) => Some(t),
            Payload::Json(_) => None,
        }
    }

    pub fn into_table(self) -> Option<TablePayload> {
        match self {
            Payload::Table(t) => Some(t),
            Payload::Json(_) => None,
        }
    }

    /// Serialized size estimate used for backend routing.
    pub fn approx_size(&self) -> usize {
        serde_json::to_string(self).map(|s| s.len()).unwrap_or(0)
    }

    /// Top-level field names, used by the structured backend's schema registry.
    pub fn field_names(&self) -> Vec<String> {
        match self {
            Payload::Table(t) => t.columns.clone(),
            Payload::Json(Value::Object(map)) => map.keys().cloned().collect(),
            Payload::Json(_) => Vec::new(),
        }
    }
}

/// A row-major table: declared column list plus one JSON object per row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub rows: Vec<JsonObject>,
}

impl TablePayload {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Builds a table from rows, deriving the column list from the keys seen.
    pub fn from_rows(rows: Vec<JsonObject>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First recognized time column, if any.
    pub fn time_column(&self) -> Option<&str> {
        TIME_COLUMNS
            .iter()
            .copied()
            .find(|name| self.columns.iter().any(|c| c == name))
    }

    /// Earliest and latest timestamps in the table, when it is time-indexed.
    pub fn date_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let col = self.time_column()?;
        let mut min: Option<DateTime<Utc>> = None;
        let mut max: Option<DateTime<Utc>> = None;
        for row in &self.rows {
            if let Some(ts) = row.get(col).and_then(parse_timestamp) {
                min = Some(min.map_or(ts, |m| m.min(ts)));
                max = Some(max.map_or(ts, |m| m.max(ts)));
            }
        }
        Some((min?, max?))
    }

    /// Keeps only rows whose timestamp falls inside the given date window.
    /// Rows without a parseable timestamp are kept, matching the behavior of
    /// filtering a frame that is not time-indexed.
    pub fn filter_by_date(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        let col = match self.time_column() {
            Some(c) => c.to_string(),
            None => return self,
        };
        if start.is_none() && end.is_none() {
            return self;
        }
        self.rows.retain(|row| {
            let ts = match row.get(&col).and_then(parse_timestamp) {
                Some(ts) => ts.date_naive(),
                None => return true,
            };
            if let Some(s) = start {
                if ts < s {
                    return false;
                }
            }
            if let Some(e) = end {
                if ts > e {
                    return false;
                }
            }
            true
        });
        self
    }
}

/// Parses a timestamp-like JSON value: RFC 3339, `YYYY-MM-DD HH:MM:SS`,
/// date-only, or numeric epoch seconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(Utc.from_utc_datetime(&naive));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
            }
            None
        }
        Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_opt(secs, 0).single()
        }
        _ => None,
    }
}

/// Canonical string form used when tables are rebuilt from the time-series
/// store, chosen so that round-trips preserve the timestamp text.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
