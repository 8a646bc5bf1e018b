pub mod catalog_queries;
pub mod job_queries;
pub mod schema;
pub mod scheduled_job_queries;
pub mod update_log_queries;
