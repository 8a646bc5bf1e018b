pub mod catalog;
pub mod job;
pub mod payload;
pub mod scheduled_job;
pub mod update_log;

pub use catalog::{AlternativeDataRecord, FundamentalDataRecord, MarketDataRecord};
pub use job::{Job, JobStatus, StepStatus, StepTrace};
pub use payload::{JsonObject, Payload, TablePayload};
pub use scheduled_job::{
    DataKind, ScheduleParams, ScheduleType, ScheduledJob, ScheduledJobInfo, ScheduledJobStatus,
    ScheduledJobSummary,
};
pub use update_log::{UpdateLog, UpdateStatus};
