use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::update_log::UpdateLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleType {
    Daily,
    Weekly,
    Monthly,
    Interval,
}

impl ScheduleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleType::Daily => "daily",
            ScheduleType::Weekly => "weekly",
            ScheduleType::Monthly => "monthly",
            ScheduleType::Interval => "interval",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(ScheduleType::Daily),
            "weekly" => Some(ScheduleType::Weekly),
            "monthly" => Some(ScheduleType::Monthly),
            "interval" => Some(ScheduleType::Interval),
            _ => None,
        }
    }
}

/// Schedule knobs. Cron-style schedules read hour/minute (plus day_of_week
/// or day-of-month); interval schedules read hours/minutes/seconds.
/// `day_of_week` is zero-based starting at Monday.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hour: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minute: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub day: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hours: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledJobStatus {
    Active,
    Paused,
    Removed,
}

impl ScheduledJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledJobStatus::Active => "active",
            ScheduledJobStatus::Paused => "paused",
            ScheduledJobStatus::Removed => "removed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ScheduledJobStatus::Active),
            "paused" => Some(ScheduledJobStatus::Paused),
            "removed" => Some(ScheduledJobStatus::Removed),
            _ => None,
        }
    }
}

/// The dataset family a scheduled update targets. Serialized into the
/// `data_type` column as `market_data`, `fundamental_data`, or
/// `alternative_<subtype>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataKind {
    Market,
    Fundamental,
    Alternative(String),
}

impl DataKind {
    pub fn label(&self) -> String {
        match self {
            DataKind::Market => "market_data".to_string(),
            DataKind::Fundamental => "fundamental_data".to_string(),
            DataKind::Alternative(subtype) => format!("alternative_{subtype}"),
        }
    }

    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "market_data" => Some(DataKind::Market),
            "fundamental_data" => Some(DataKind::Fundamental),
            other => other
                .strip_prefix("alternative_")
                .filter(|s| !s.is_empty())
                .map(|s| DataKind::Alternative(s.to_string())),
        }
    }
}

/// A persisted recurring update definition. The live trigger is rebuilt from
/// this row at process start; only `status` and `last_updated` mutate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub job_id: String,
    pub name: String,
    pub data_type: String,
    pub source: String,
    pub schedule_type: ScheduleType,
    pub schedule_params: ScheduleParams,
    pub symbols: Vec<String>,
    pub status: ScheduledJobStatus,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJobSummary {
    #[serde(flatten)]
    pub job: ScheduledJob,
    pub next_run_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScheduledJobInfo {
    #[serde(flatten)]
    pub job: ScheduledJob,
    pub next_run_time: Option<DateTime<Utc>>,
    pub recent_logs: Vec<UpdateLog>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_kind_labels_round_trip() {
        assert_eq!(DataKind::parse("market_data"), Some(DataKind::Market));
        assert_eq!(
            DataKind::parse("fundamental_data"),
            Some(DataKind::Fundamental)
        );
        assert_eq!(
            DataKind::parse("alternative_sentiment"),
            Some(DataKind::Alternative("sentiment".into()))
        );
        assert_eq!(DataKind::parse("alternative_"), None);
        assert_eq!(DataKind::parse("weather"), None);

        let kind = DataKind::Alternative("news".into());
        assert_eq!(DataKind::parse(&kind.label()), Some(kind));
    }
}
